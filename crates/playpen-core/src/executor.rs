//! Executor assembly.
//!
//! An [`ExecutorBuilder`] accumulates the compile, run and test commands of
//! one pipeline and freezes them into an [`Executor`]. Building does no I/O,
//! so two builds from the same inputs compare equal.
//!
//! # Example
//!
//! ```
//! use playpen_core::ExecutorBuilder;
//!
//! let executor = ExecutorBuilder::new()
//!     .compiler(|c| c.command("javac").args(["-d", "bin", "Main.java"]))
//!     .runner(|r| r.command("java").args(["-cp", "bin:"]).pipeline_options(["--verbose"]))
//!     .test_runner(|t| t.command("java").args(["-cp", "bin:", "org.junit.runner.JUnitCore"]))
//!     .executable_name("Main")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(executor.run().args(), ["-cp", "bin:", "Main", "--verbose"]);
//! ```

use crate::error::BuildError;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Split a raw pipeline options string into arguments.
///
/// Whitespace runs collapse to one separator. An empty string yields one
/// empty option, which the run command receives as an empty argument.
pub fn parse_pipeline_options(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .split(' ')
        .map(str::to_string)
        .collect()
}

/// Configuration of one stage, accumulated by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageBuilder {
    command: Option<String>,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
    pipeline_options: Vec<String>,
}

impl StageBuilder {
    /// Set the program to execute.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Append declared arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory of the child process.
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set pipeline options. Only the run stage uses them.
    pub fn pipeline_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline_options = options.into_iter().map(Into::into).collect();
        self
    }

    fn has_command(&self) -> bool {
        self.command.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Fluent builder for [`Executor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorBuilder {
    compile: Option<StageBuilder>,
    run: StageBuilder,
    test: StageBuilder,
    executable_name: Option<String>,
}

impl ExecutorBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the compile stage. Without it the backend is interpreted.
    pub fn compiler(mut self, configure: impl FnOnce(StageBuilder) -> StageBuilder) -> Self {
        self.compile = Some(configure(self.compile.unwrap_or_default()));
        self
    }

    /// Configure the run stage.
    pub fn runner(mut self, configure: impl FnOnce(StageBuilder) -> StageBuilder) -> Self {
        self.run = configure(self.run);
        self
    }

    /// Configure the test stage.
    pub fn test_runner(mut self, configure: impl FnOnce(StageBuilder) -> StageBuilder) -> Self {
        self.test = configure(self.test);
        self
    }

    /// Bind the artifact the run and test commands operate on.
    pub fn executable_name(mut self, name: impl Into<String>) -> Self {
        self.executable_name = Some(name.into());
        self
    }

    /// Whether an executable name has been bound.
    pub fn has_executable_name(&self) -> bool {
        self.executable_name.is_some()
    }

    /// Freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingCommand`] if the run or test stage, or a
    /// configured compile stage, has no command.
    pub fn build(&self) -> Result<Executor, BuildError> {
        let compile = match &self.compile {
            Some(stage) if !stage.has_command() => {
                return Err(BuildError::MissingCommand("compile"))
            }
            Some(stage) => Some(Invocation::from_stage(stage, stage.args.clone())),
            None => None,
        };
        if !self.run.has_command() {
            return Err(BuildError::MissingCommand("run"));
        }
        if !self.test.has_command() {
            return Err(BuildError::MissingCommand("test"));
        }

        let mut run_args = self.run.args.clone();
        run_args.extend(self.executable_name.iter().cloned());
        run_args.extend(self.run.pipeline_options.iter().cloned());

        let mut test_args = self.test.args.clone();
        test_args.extend(self.executable_name.iter().cloned());

        Ok(Executor {
            compile,
            run: Invocation::from_stage(&self.run, run_args),
            test: Invocation::from_stage(&self.test, test_args),
        })
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    command: String,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
}

impl Invocation {
    fn from_stage(stage: &StageBuilder, args: Vec<String>) -> Self {
        Self {
            command: stage.command.clone().unwrap_or_default(),
            args,
            work_dir: stage.work_dir.clone(),
        }
    }

    /// Program to execute.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Create a child process command with piped output and no stdin.
    ///
    /// The child is killed if the returned command's child handle is dropped.
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Immutable compile/run/test commands of one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executor {
    compile: Option<Invocation>,
    run: Invocation,
    test: Invocation,
}

impl Executor {
    /// Compile invocation, absent for interpreted backends.
    pub fn compile(&self) -> Option<&Invocation> {
        self.compile.as_ref()
    }

    /// Run invocation.
    pub fn run(&self) -> &Invocation {
        &self.run
    }

    /// Test invocation.
    pub fn test(&self) -> &Invocation {
        &self.test
    }

    /// The run invocation, or the test invocation when `unit_test` is set.
    pub fn select(&self, unit_test: bool) -> &Invocation {
        if unit_test {
            &self.test
        } else {
            &self.run
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ExecutorBuilder {
        ExecutorBuilder::new()
            .runner(|r| r.command("runCommand").args(["arg1"]))
            .test_runner(|t| t.command("testCommand").args(["arg1"]))
    }

    #[test]
    fn test_parse_pipeline_options() {
        assert_eq!(parse_pipeline_options(""), vec![""]);
        assert_eq!(parse_pipeline_options("--a"), vec!["--a"]);
        assert_eq!(
            parse_pipeline_options("  --a   1\t--b  "),
            vec!["--a", "1", "--b"]
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = base().executable_name("Main").build().unwrap();
        let b = base().executable_name("Main").build().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_args_keep_empty_options() {
        let executor = base().runner(|r| r.pipeline_options([""])).build().unwrap();
        assert_eq!(executor.run().command(), "runCommand");
        assert_eq!(executor.run().args(), ["arg1", ""]);
    }

    #[test]
    fn test_run_args_order() {
        let executor = base()
            .runner(|r| r.pipeline_options(["--x", "1"]))
            .executable_name("Main")
            .build()
            .unwrap();
        assert_eq!(executor.run().args(), ["arg1", "Main", "--x", "1"]);
    }

    #[test]
    fn test_test_args_ignore_pipeline_options() {
        let executor = base()
            .runner(|r| r.pipeline_options(["--x"]))
            .test_runner(|t| t.pipeline_options(["--ignored"]))
            .build()
            .unwrap();
        assert_eq!(executor.test().command(), "testCommand");
        assert_eq!(executor.test().args(), ["arg1"]);
    }

    #[test]
    fn test_select() {
        let executor = base().build().unwrap();
        assert_eq!(executor.select(false).command(), "runCommand");
        assert_eq!(executor.select(true).command(), "testCommand");
    }

    #[test]
    fn test_binding_name_after_compile_matches_fresh_build() {
        let before = base().compiler(|c| c.command("javac").args(["-d", "bin"]));
        let rebound = before.clone().executable_name("fakeFileName").build().unwrap();
        let fresh = ExecutorBuilder::new()
            .executable_name("fakeFileName")
            .compiler(|c| c.command("javac").args(["-d", "bin"]))
            .runner(|r| r.command("runCommand").args(["arg1"]))
            .test_runner(|t| t.command("testCommand").args(["arg1"]))
            .build()
            .unwrap();
        assert_eq!(rebound, fresh);
        assert!(!before.has_executable_name());
    }

    #[test]
    fn test_missing_commands() {
        assert_eq!(
            ExecutorBuilder::new().build(),
            Err(BuildError::MissingCommand("run"))
        );
        assert_eq!(
            ExecutorBuilder::new()
                .runner(|r| r.command("java"))
                .build(),
            Err(BuildError::MissingCommand("test"))
        );
        assert_eq!(
            base().compiler(|c| c.args(["-d"])).build(),
            Err(BuildError::MissingCommand("compile"))
        );
    }

    #[test]
    fn test_compile_absent_for_interpreted() {
        let executor = base().build().unwrap();
        assert!(executor.compile().is_none());
    }

    #[test]
    fn test_invocation_display_quotes_empty_args() {
        let executor = base().runner(|r| r.pipeline_options([""])).build().unwrap();
        assert_eq!(executor.run().to_string(), "runCommand arg1 \"\"");
    }
}
