//! Pipeline identifiers and the processing status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one code processing request.
///
/// Every cache record and every on-disk folder of a pipeline is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(Uuid);

impl PipelineId {
    /// Create a new random pipeline ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PipelineId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Processing status of a pipeline.
///
/// ```text
/// UNSPECIFIED -> VALIDATING -> VALIDATION_ERROR
///                           -> COMPILING -> COMPILE_ERROR
///                                        -> EXECUTING
///                           -> EXECUTING -> RUN_TIMEOUT | CANCELED | RUN_ERROR | FINISHED
/// ```
///
/// `RUN_TIMEOUT` and `CANCELED` may also be reached from `VALIDATING` and
/// `COMPILING`, because the pipeline deadline and the caller's token race
/// against every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Nothing recorded yet
    #[default]
    Unspecified,
    /// Validators are running
    Validating,
    /// A validator rejected the source
    ValidationError,
    /// Compile command is running
    Compiling,
    /// Compile command exited nonzero
    CompileError,
    /// Run or test command is running
    Executing,
    /// The pipeline deadline elapsed
    RunTimeout,
    /// The pipeline was canceled
    Canceled,
    /// Run or test command exited nonzero
    RunError,
    /// Run or test command exited zero
    Finished,
}

impl Status {
    /// Whether no further stage executes after this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ValidationError
                | Self::CompileError
                | Self::RunTimeout
                | Self::Canceled
                | Self::RunError
                | Self::Finished
        )
    }

    /// Whether `next` may be recorded after `self`.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;
        match (self, next) {
            (Unspecified, Validating) => true,
            (Validating, ValidationError | Compiling | Executing) => true,
            (Compiling, CompileError | Executing) => true,
            (Executing, RunError | Finished) => true,
            (Validating | Compiling | Executing, RunTimeout | Canceled) => true,
            _ => false,
        }
    }

    /// Protocol name of the status, e.g. `STATUS_FINISHED`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "STATUS_UNSPECIFIED",
            Self::Validating => "STATUS_VALIDATING",
            Self::ValidationError => "STATUS_VALIDATION_ERROR",
            Self::Compiling => "STATUS_COMPILING",
            Self::CompileError => "STATUS_COMPILE_ERROR",
            Self::Executing => "STATUS_EXECUTING",
            Self::RunTimeout => "STATUS_RUN_TIMEOUT",
            Self::Canceled => "STATUS_CANCELED",
            Self::RunError => "STATUS_RUN_ERROR",
            Self::Finished => "STATUS_FINISHED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
