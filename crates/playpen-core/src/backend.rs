//! Language backends.
//!
//! A backend turns an [`SdkEnvironment`] and a [`LifeCycle`] into an
//! [`ExecutorBuilder`], owns its validator set, and knows whether the
//! artifact name must be discovered after compilation. The orchestrator
//! receives one backend and never branches on the language itself.

use crate::environment::{SdkEnvironment, SdkKind};
use crate::error::Result;
use crate::executor::ExecutorBuilder;
use crate::lifecycle::LifeCycle;
use crate::validators::ValidatorSet;
use async_trait::async_trait;
use std::sync::Arc;

/// Compile, run and test commands of one language.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Language of this backend.
    fn kind(&self) -> SdkKind;

    /// Validators to run before compiling.
    fn validators(&self) -> ValidatorSet {
        ValidatorSet::for_sdk(self.kind())
    }

    /// Builder with every command of the pipeline configured.
    ///
    /// When [`needs_artifact_name`](Self::needs_artifact_name) is false the
    /// executable name is already bound.
    fn executor_builder(&self, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder;

    /// Whether the run command needs a name only known after compiling.
    fn needs_artifact_name(&self) -> bool {
        false
    }

    /// Discover the artifact name after a successful compile.
    async fn resolve_artifact_name(&self, lc: &LifeCycle) -> Result<String> {
        let lc = lc.clone();
        tokio::task::spawn_blocking(move || lc.resolve_executable_name())
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Select the backend for `env`.
pub fn backend_for(env: SdkEnvironment) -> Arc<dyn Backend> {
    match env.kind {
        SdkKind::Java => Arc::new(JavaBackend { env }),
        SdkKind::Go => Arc::new(GoBackend { env }),
        SdkKind::Python => Arc::new(PythonBackend { env }),
        SdkKind::Shell => Arc::new(ShellBackend { env }),
    }
}

/// Compile step shared by every backend: configured args, then the source.
fn with_compiler(builder: ExecutorBuilder, env: &SdkEnvironment, lc: &LifeCycle) -> ExecutorBuilder {
    if !env.has_compile_step() {
        return builder;
    }
    let commands = &env.commands;
    let source = lc.absolute_source_file_path().to_string_lossy().into_owned();
    builder.compiler(|c| {
        c.command(&commands.compile_cmd)
            .args(commands.compile_args.iter().cloned())
            .args([source])
            .work_dir(lc.absolute_base_folder_path())
    })
}

/// Run and test stages that execute the source file directly.
fn interpreted(env: &SdkEnvironment, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder {
    let commands = &env.commands;
    let dir = lc.absolute_base_folder_path();
    let builder = ExecutorBuilder::new()
        .runner(|r| {
            r.command(&commands.run_cmd)
                .args(commands.run_args.iter().cloned())
                .pipeline_options(pipeline_options.iter().cloned())
                .work_dir(dir)
        })
        .test_runner(|t| {
            t.command(&commands.test_cmd)
                .args(commands.test_args.iter().cloned())
                .work_dir(dir)
        })
        .executable_name(lc.absolute_executable_file_path().to_string_lossy());
    with_compiler(builder, env, lc)
}

/// `javac` into `bin/`, then `java` on the class that declares `main`.
#[derive(Debug, Clone)]
pub struct JavaBackend {
    env: SdkEnvironment,
}

#[async_trait]
impl Backend for JavaBackend {
    fn kind(&self) -> SdkKind {
        SdkKind::Java
    }

    fn executor_builder(&self, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder {
        let commands = &self.env.commands;
        let dir = lc.absolute_base_folder_path();
        let builder = ExecutorBuilder::new()
            .runner(|r| {
                r.command(&commands.run_cmd)
                    .args(commands.run_args.iter().cloned())
                    .pipeline_options(pipeline_options.iter().cloned())
                    .work_dir(dir)
            })
            .test_runner(|t| {
                t.command(&commands.test_cmd)
                    .args(commands.test_args.iter().cloned())
                    .work_dir(dir)
            });
        with_compiler(builder, &self.env, lc)
    }

    fn needs_artifact_name(&self) -> bool {
        true
    }
}

/// `go build -o bin/<id>`, then the binary itself.
#[derive(Debug, Clone)]
pub struct GoBackend {
    env: SdkEnvironment,
}

#[async_trait]
impl Backend for GoBackend {
    fn kind(&self) -> SdkKind {
        SdkKind::Go
    }

    fn executor_builder(&self, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder {
        let commands = &self.env.commands;
        let dir = lc.absolute_base_folder_path();
        let binary = lc.absolute_executable_file_path().to_string_lossy().into_owned();
        let source = lc.absolute_source_file_path().to_string_lossy().into_owned();
        // A configured run command wraps the binary; otherwise the binary is the command.
        let (run_cmd, run_args) = if commands.run_cmd.trim().is_empty() {
            (binary.clone(), commands.run_args.clone())
        } else {
            let mut args = commands.run_args.clone();
            args.push(binary.clone());
            (commands.run_cmd.clone(), args)
        };

        ExecutorBuilder::new()
            .compiler(|c| {
                c.command(&commands.compile_cmd)
                    .args(commands.compile_args.iter().cloned())
                    .args(["-o".to_string(), binary, source.clone()])
                    .work_dir(dir)
            })
            .runner(|r| {
                r.command(run_cmd)
                    .args(run_args)
                    .pipeline_options(pipeline_options.iter().cloned())
                    .work_dir(dir)
            })
            .test_runner(|t| {
                t.command(&commands.test_cmd)
                    .args(commands.test_args.iter().cloned())
                    .args([source])
                    .work_dir(dir)
            })
    }
}

/// Interpreted Python.
#[derive(Debug, Clone)]
pub struct PythonBackend {
    env: SdkEnvironment,
}

#[async_trait]
impl Backend for PythonBackend {
    fn kind(&self) -> SdkKind {
        SdkKind::Python
    }

    fn executor_builder(&self, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder {
        interpreted(&self.env, lc, pipeline_options)
    }
}

/// POSIX shell, syntax-checked with `sh -n` by default.
#[derive(Debug, Clone)]
pub struct ShellBackend {
    env: SdkEnvironment,
}

#[async_trait]
impl Backend for ShellBackend {
    fn kind(&self) -> SdkKind {
        SdkKind::Shell
    }

    fn executor_builder(&self, lc: &LifeCycle, pipeline_options: &[String]) -> ExecutorBuilder {
        interpreted(&self.env, lc, pipeline_options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::CommandConfig;
    use crate::types::PipelineId;
    use std::path::Path;

    fn lc(kind: SdkKind) -> LifeCycle {
        LifeCycle::new(kind, PipelineId::new(), "/work")
    }

    #[test]
    fn test_backend_selection() {
        for kind in [SdkKind::Java, SdkKind::Go, SdkKind::Python, SdkKind::Shell] {
            assert_eq!(backend_for(SdkEnvironment::defaults(kind)).kind(), kind);
        }
    }

    #[test]
    fn test_java_commands() {
        let lc = lc(SdkKind::Java);
        let backend = backend_for(SdkEnvironment::defaults(SdkKind::Java));
        assert!(backend.needs_artifact_name());

        let executor = backend
            .executor_builder(&lc, &["".to_string()])
            .executable_name("HelloWorld")
            .build()
            .unwrap();

        let compile = executor.compile().unwrap();
        assert_eq!(compile.command(), "javac");
        assert_eq!(
            compile.args(),
            [
                "-d".to_string(),
                "bin".to_string(),
                lc.absolute_source_file_path().to_string_lossy().into_owned()
            ]
        );
        assert_eq!(compile.work_dir(), Some(lc.absolute_base_folder_path()));
        assert_eq!(executor.run().args(), ["-cp", "bin:", "HelloWorld", ""]);
        assert_eq!(
            executor.test().args(),
            ["-cp", "bin:", "org.junit.runner.JUnitCore", "HelloWorld"]
        );
    }

    #[test]
    fn test_go_runs_binary() {
        let lc = lc(SdkKind::Go);
        let backend = backend_for(SdkEnvironment::defaults(SdkKind::Go));
        assert!(!backend.needs_artifact_name());

        let executor = backend.executor_builder(&lc, &[]).build().unwrap();
        let binary = lc.absolute_executable_file_path().to_string_lossy().into_owned();
        assert_eq!(executor.run().command(), binary);
        assert!(executor.run().args().is_empty());
        let compile = executor.compile().unwrap();
        assert_eq!(compile.command(), "go");
        assert_eq!(compile.args()[0], "build");
        assert_eq!(compile.args()[2], binary);
    }

    #[test]
    fn test_python_is_interpreted() {
        let lc = lc(SdkKind::Python);
        let backend = backend_for(SdkEnvironment::defaults(SdkKind::Python));
        let executor = backend
            .executor_builder(&lc, &["--flag".to_string()])
            .build()
            .unwrap();
        assert!(executor.compile().is_none());
        let source = lc.absolute_source_file_path().to_string_lossy().into_owned();
        assert_eq!(executor.run().command(), "python3");
        assert_eq!(executor.run().args(), [source.clone(), "--flag".to_string()]);
        assert_eq!(executor.test().args(), ["-v".to_string(), source]);
    }

    #[test]
    fn test_shell_syntax_check() {
        let lc = lc(SdkKind::Shell);
        let backend = backend_for(SdkEnvironment::defaults(SdkKind::Shell));
        let executor = backend.executor_builder(&lc, &[]).build().unwrap();
        let compile = executor.compile().unwrap();
        assert_eq!(compile.command(), "sh");
        assert_eq!(compile.args()[0], "-n");
    }

    #[test]
    fn test_shell_without_compile_command() {
        let env = SdkEnvironment::new(
            SdkKind::Shell,
            CommandConfig {
                run_cmd: "sh".into(),
                test_cmd: "sh".into(),
                ..Default::default()
            },
        );
        let executor = backend_for(env)
            .executor_builder(&lc(SdkKind::Shell), &[])
            .build()
            .unwrap();
        assert!(executor.compile().is_none());
    }

    #[tokio::test]
    async fn test_resolve_artifact_uses_lifecycle_resolver() {
        let lc = lc(SdkKind::Java).with_executable_name_resolver(Arc::new(
            |_: PipelineId, _: &Path| -> Result<String> { Ok("fakeFileName".to_string()) },
        ));
        let backend = backend_for(SdkEnvironment::defaults(SdkKind::Java));
        assert_eq!(
            backend.resolve_artifact_name(&lc).await.unwrap(),
            "fakeFileName"
        );
    }
}
