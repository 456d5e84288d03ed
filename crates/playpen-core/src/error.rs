//! Error types for playpen-core.

use crate::cache::Slot;
use crate::PipelineId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for playpen-core setup operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Infrastructure errors raised while setting a pipeline up.
///
/// These never become a recorded status: they are returned to the caller
/// before the orchestrator writes `VALIDATING`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cache failure
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Environment or backend configuration is unusable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Executor could not be assembled
    #[error("executor error: {0}")]
    Build(#[from] BuildError),

    /// Compiled artifact could not be located
    #[error("artifact not found in {dir}: {reason}")]
    Artifact {
        /// Directory that was searched
        dir: PathBuf,
        /// Why resolution failed
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a [`Cache`](crate::Cache) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The slot was never written for this pipeline (or the record expired).
    #[error("no value for {slot} of pipeline {pipeline_id}")]
    NotFound {
        /// Pipeline that was queried
        pipeline_id: PipelineId,
        /// Slot that was queried
        slot: Slot,
    },

    /// The backing store could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to pollers by the typed accessors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    /// Nothing has been written yet: the caller should poll again later.
    #[error("{slot} not found for pipeline {pipeline_id}")]
    NotFound {
        /// Pipeline that was queried
        pipeline_id: PipelineId,
        /// Slot that was queried
        slot: Slot,
    },

    /// The requested slot does not hold the shape this accessor returns.
    #[error("{slot} cannot be read as {expected}")]
    TypeConversion {
        /// Slot that was requested
        slot: Slot,
        /// Shape the accessor expected
        expected: &'static str,
    },

    /// Any other cache failure
    #[error(transparent)]
    Cache(CacheError),
}

impl From<CacheError> for AccessError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound { pipeline_id, slot } => Self::NotFound { pipeline_id, slot },
            other => Self::Cache(other),
        }
    }
}

impl AccessError {
    /// Check if this error means "not ready yet" rather than a caller mistake.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by [`ExecutorBuilder::build`](crate::ExecutorBuilder::build).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A required stage has no command.
    #[error("{0} command is not set")]
    MissingCommand(&'static str),
}

/// Errors raised by a validator that rejects the source.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// No source file was prepared.
    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    /// The source file has the wrong extension for this backend.
    #[error("expected a .{expected} file, got {path}")]
    WrongExtension {
        /// Offending path
        path: PathBuf,
        /// Extension the backend requires
        expected: String,
    },

    /// Reading the source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown SDK name
    #[error("unknown SDK: {0}")]
    UnknownSdk(String),

    /// SDK config file could not be read
    #[error("cannot read SDK config {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// SDK config file is not valid JSON for this schema
    #[error("invalid SDK config {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// A run or test command is missing
    #[error("SDK {sdk} has no {stage} command")]
    MissingCommand {
        /// SDK name
        sdk: String,
        /// Stage that lacks a command
        stage: &'static str,
    },
}
