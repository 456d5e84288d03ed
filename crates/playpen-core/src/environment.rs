//! Application and SDK environments.
//!
//! The application environment is loaded from environment variables with
//! defaults. SDK environments describe one backend's commands and are read
//! from `<config_dir>/<SDK_NAME>.json`, falling back to built-in defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default deadline for a whole pipeline (15 minutes).
pub const DEFAULT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default interval between polls of the cancel flag.
pub const DEFAULT_CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default lifetime of a finished pipeline's cache record.
pub const DEFAULT_KEY_EXPIRATION: Duration = Duration::from_secs(15 * 60);

/// Process-wide configuration shared by every pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationEnvironment {
    /// Root under which pipeline folders are created.
    pub working_dir: PathBuf,
    /// Deadline for one pipeline, measured from the start of `process`.
    pub pipeline_timeout: Duration,
    /// How often the cancel watcher reads the cache.
    pub cancel_poll_interval: Duration,
    /// How long a finished pipeline's record stays readable.
    pub key_expiration: Duration,
    /// Backend served by this process.
    pub sdk: SdkKind,
    /// Directory holding `<SDK_NAME>.json` files.
    pub sdk_config_dir: PathBuf,
}

impl Default for ApplicationEnvironment {
    fn default() -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            sdk_config_dir: working_dir.join("configs"),
            working_dir,
            pipeline_timeout: DEFAULT_PIPELINE_TIMEOUT,
            cancel_poll_interval: DEFAULT_CANCEL_POLL_INTERVAL,
            key_expiration: DEFAULT_KEY_EXPIRATION,
            sdk: SdkKind::Java,
        }
    }
}

impl ApplicationEnvironment {
    /// Create an environment rooted at `working_dir` with default timeouts.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            sdk_config_dir: working_dir.join("configs"),
            working_dir,
            ..Self::default()
        }
    }

    /// Override the pipeline deadline.
    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    /// Override the cancel poll interval.
    pub fn with_cancel_poll_interval(mut self, interval: Duration) -> Self {
        self.cancel_poll_interval = interval;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `PLAYPEN_WORK_DIR` | current directory |
    /// | `PLAYPEN_PIPELINE_TIMEOUT_SECS` | `900` |
    /// | `PLAYPEN_CANCEL_POLL_MS` | `500` |
    /// | `PLAYPEN_KEY_EXPIRATION_SECS` | `900` |
    /// | `PLAYPEN_SDK` | `SDK_JAVA` |
    /// | `PLAYPEN_SDK_CONFIG_DIR` | `<work dir>/configs` |
    ///
    /// # Errors
    ///
    /// Returns an error only when `PLAYPEN_SDK` names an unknown SDK.
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value. [`from_env`](Self::from_env) reads the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.parse::<u64>().ok());

        let working_dir = lookup("PLAYPEN_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(default.working_dir);
        let sdk_config_dir = lookup("PLAYPEN_SDK_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join("configs"));
        let sdk = match lookup("PLAYPEN_SDK") {
            Some(v) => v.parse()?,
            None => default.sdk,
        };

        Ok(Self {
            working_dir,
            sdk_config_dir,
            sdk,
            pipeline_timeout: number("PLAYPEN_PIPELINE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.pipeline_timeout),
            cancel_poll_interval: number("PLAYPEN_CANCEL_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.cancel_poll_interval),
            key_expiration: number("PLAYPEN_KEY_EXPIRATION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.key_expiration),
        })
    }

    /// Load the SDK environment for the configured SDK.
    pub fn load_sdk_environment(&self) -> Result<SdkEnvironment, ConfigError> {
        SdkEnvironment::load(self.sdk, &self.sdk_config_dir)
    }
}

/// Language backend a pipeline targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkKind {
    /// Java, compiled with `javac`
    #[serde(rename = "SDK_JAVA")]
    Java,
    /// Go, compiled with `go build`
    #[serde(rename = "SDK_GO")]
    Go,
    /// Python, interpreted
    #[serde(rename = "SDK_PYTHON")]
    Python,
    /// POSIX shell, syntax-checked then interpreted
    #[serde(rename = "SDK_SHELL")]
    Shell,
}

impl SdkKind {
    /// Protocol name, also the config file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Java => "SDK_JAVA",
            Self::Go => "SDK_GO",
            Self::Python => "SDK_PYTHON",
            Self::Shell => "SDK_SHELL",
        }
    }

    /// Source file extension, without the dot.
    pub fn source_extension(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Go => "go",
            Self::Python => "py",
            Self::Shell => "sh",
        }
    }
}

impl fmt::Display for SdkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SdkKind {
    type Err = ConfigError;

    /// Parse `SDK_JAVA` or `java` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let name = upper.strip_prefix("SDK_").unwrap_or(&upper);
        match name {
            "JAVA" => Ok(Self::Java),
            "GO" => Ok(Self::Go),
            "PYTHON" => Ok(Self::Python),
            "SHELL" | "SH" => Ok(Self::Shell),
            _ => Err(ConfigError::UnknownSdk(s.to_string())),
        }
    }
}

/// Command templates of one backend, as stored in its JSON config file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Compile command; empty for interpreted backends
    #[serde(default)]
    pub compile_cmd: String,
    /// Run command
    pub run_cmd: String,
    /// Test command
    pub test_cmd: String,
    /// Compile arguments, before the source file
    #[serde(default)]
    pub compile_args: Vec<String>,
    /// Run arguments, before the executable name
    #[serde(default)]
    pub run_args: Vec<String>,
    /// Test arguments, before the executable name
    #[serde(default)]
    pub test_args: Vec<String>,
}

/// Immutable description of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkEnvironment {
    /// Backend kind
    pub kind: SdkKind,
    /// Command templates
    pub commands: CommandConfig,
}

impl SdkEnvironment {
    /// Create an environment from explicit commands.
    pub fn new(kind: SdkKind, commands: CommandConfig) -> Self {
        Self { kind, commands }
    }

    /// Built-in commands for `kind`.
    pub fn defaults(kind: SdkKind) -> Self {
        let strings = |args: &[&str]| args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        let commands = match kind {
            SdkKind::Java => CommandConfig {
                compile_cmd: "javac".into(),
                run_cmd: "java".into(),
                test_cmd: "java".into(),
                compile_args: strings(&["-d", "bin"]),
                run_args: strings(&["-cp", "bin:"]),
                test_args: strings(&["-cp", "bin:", "org.junit.runner.JUnitCore"]),
            },
            SdkKind::Go => CommandConfig {
                compile_cmd: "go".into(),
                run_cmd: String::new(),
                test_cmd: "go".into(),
                compile_args: strings(&["build"]),
                run_args: Vec::new(),
                test_args: strings(&["test", "-v"]),
            },
            SdkKind::Python => CommandConfig {
                compile_cmd: String::new(),
                run_cmd: "python3".into(),
                test_cmd: "pytest".into(),
                compile_args: Vec::new(),
                run_args: Vec::new(),
                test_args: strings(&["-v"]),
            },
            SdkKind::Shell => CommandConfig {
                compile_cmd: "sh".into(),
                run_cmd: "sh".into(),
                test_cmd: "sh".into(),
                compile_args: strings(&["-n"]),
                run_args: Vec::new(),
                test_args: Vec::new(),
            },
        };
        Self { kind, commands }
    }

    /// Load `<config_dir>/<SDK_NAME>.json`, or the built-in defaults when
    /// the file does not exist.
    pub fn load(kind: SdkKind, config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(format!("{}.json", kind.as_str()));
        if !path.exists() {
            tracing::debug!(sdk = %kind, path = %path.display(), "No SDK config file, using defaults");
            return Ok(Self::defaults(kind));
        }
        let env = Self::from_file(kind, &path)?;
        tracing::info!(sdk = %kind, path = %path.display(), "SDK config loaded");
        Ok(env)
    }

    /// Parse an SDK config file.
    pub fn from_file(kind: SdkKind, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let commands: CommandConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let env = Self { kind, commands };
        env.validate()?;
        Ok(env)
    }

    /// Check that the commands a backend needs are present.
    ///
    /// Go runs the binary it built, so it needs no run command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind != SdkKind::Go && self.commands.run_cmd.trim().is_empty() {
            return Err(ConfigError::MissingCommand {
                sdk: self.kind.to_string(),
                stage: "run",
            });
        }
        if self.commands.test_cmd.trim().is_empty() {
            return Err(ConfigError::MissingCommand {
                sdk: self.kind.to_string(),
                stage: "test",
            });
        }
        if self.kind == SdkKind::Go && !self.has_compile_step() {
            return Err(ConfigError::MissingCommand {
                sdk: self.kind.to_string(),
                stage: "compile",
            });
        }
        Ok(())
    }

    /// Whether the backend compiles before running.
    pub fn has_compile_step(&self) -> bool {
        !self.commands.compile_cmd.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const JAVA_CONFIG: &str = r#"{
  "compile_cmd": "javac",
  "run_cmd": "java",
  "test_cmd": "java",
  "compile_args": ["-d", "bin", "-classpath"],
  "run_args": ["-cp", "bin:"],
  "test_args": ["-cp", "bin:", "JUnit"]
}"#;

    #[test]
    fn test_sdk_kind_parsing() {
        assert_eq!("SDK_JAVA".parse::<SdkKind>().unwrap(), SdkKind::Java);
        assert_eq!("java".parse::<SdkKind>().unwrap(), SdkKind::Java);
        assert_eq!("Go".parse::<SdkKind>().unwrap(), SdkKind::Go);
        assert_eq!("sdk_python".parse::<SdkKind>().unwrap(), SdkKind::Python);
        assert_eq!("sh".parse::<SdkKind>().unwrap(), SdkKind::Shell);
        assert!("cobol".parse::<SdkKind>().is_err());
    }

    #[test]
    fn test_sdk_kind_display_round_trips() {
        for kind in [SdkKind::Java, SdkKind::Go, SdkKind::Python, SdkKind::Shell] {
            assert_eq!(kind.to_string().parse::<SdkKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        for kind in [SdkKind::Java, SdkKind::Go, SdkKind::Python, SdkKind::Shell] {
            SdkEnvironment::defaults(kind).validate().unwrap();
        }
        assert!(!SdkEnvironment::defaults(SdkKind::Python).has_compile_step());
        assert!(SdkEnvironment::defaults(SdkKind::Java).has_compile_step());
    }

    #[test]
    fn test_load_from_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("SDK_JAVA.json"), JAVA_CONFIG).unwrap();

        let env = SdkEnvironment::load(SdkKind::Java, dir.path()).unwrap();
        assert_eq!(env.commands.compile_cmd, "javac");
        assert_eq!(env.commands.compile_args, vec!["-d", "bin", "-classpath"]);
        assert_eq!(env.commands.test_args, vec!["-cp", "bin:", "JUnit"]);
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let env = SdkEnvironment::load(SdkKind::Python, dir.path()).unwrap();
        assert_eq!(env, SdkEnvironment::defaults(SdkKind::Python));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SDK_JAVA.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SdkEnvironment::from_file(SdkKind::Java, &path),
            Err(ConfigError::Parse { .. })
        ));

        std::fs::write(&path, r#"{"run_cmd": "", "test_cmd": "java"}"#).unwrap();
        assert!(matches!(
            SdkEnvironment::from_file(SdkKind::Java, &path),
            Err(ConfigError::MissingCommand { stage: "run", .. })
        ));
    }

    #[test]
    fn test_application_environment_builders() {
        let env = ApplicationEnvironment::new("/srv/playpen")
            .with_pipeline_timeout(Duration::ZERO)
            .with_cancel_poll_interval(Duration::from_millis(10));
        assert_eq!(env.working_dir, PathBuf::from("/srv/playpen"));
        assert_eq!(env.sdk_config_dir, PathBuf::from("/srv/playpen/configs"));
        assert_eq!(env.pipeline_timeout, Duration::ZERO);
        assert_eq!(env.cancel_poll_interval, Duration::from_millis(10));
        assert_eq!(env.key_expiration, DEFAULT_KEY_EXPIRATION);
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let env = ApplicationEnvironment::from_lookup(|_| None).unwrap();
        assert_eq!(env.pipeline_timeout, DEFAULT_PIPELINE_TIMEOUT);
        assert_eq!(env.cancel_poll_interval, DEFAULT_CANCEL_POLL_INTERVAL);
        assert_eq!(env.key_expiration, DEFAULT_KEY_EXPIRATION);
        assert_eq!(env.sdk, SdkKind::Java);
        assert_eq!(env.sdk_config_dir, env.working_dir.join("configs"));
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = [
            ("PLAYPEN_WORK_DIR", "/srv/playpen"),
            ("PLAYPEN_PIPELINE_TIMEOUT_SECS", "30"),
            ("PLAYPEN_CANCEL_POLL_MS", "not-a-number"),
            ("PLAYPEN_SDK", "SDK_GO"),
        ]
        .into_iter()
        .collect();

        let env =
            ApplicationEnvironment::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(env.working_dir, PathBuf::from("/srv/playpen"));
        assert_eq!(env.sdk_config_dir, PathBuf::from("/srv/playpen/configs"));
        assert_eq!(env.pipeline_timeout, Duration::from_secs(30));
        assert_eq!(env.cancel_poll_interval, DEFAULT_CANCEL_POLL_INTERVAL);
        assert_eq!(env.sdk, SdkKind::Go);
    }

    #[test]
    fn test_from_lookup_rejects_unknown_sdk() {
        let result = ApplicationEnvironment::from_lookup(|key| {
            (key == "PLAYPEN_SDK").then(|| "SDK_COBOL".to_string())
        });
        assert!(matches!(result, Err(ConfigError::UnknownSdk(_))));
    }
}
