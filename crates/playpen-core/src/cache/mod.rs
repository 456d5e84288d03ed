//! Per-pipeline cache records.
//!
//! A record is a set of named slots. Each slot holds exactly one shape of
//! value: [`SlotValue`] carries its slot in its variant, so writing a
//! string into the status slot cannot be expressed. A slot that was never
//! written is reported as [`CacheError::NotFound`], which is distinct from
//! a slot holding an empty string.

mod local;

pub use local::LocalCache;

use crate::error::CacheError;
use crate::types::{PipelineId, Status};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Named field of a pipeline's cache record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Slot {
    /// Processing status
    Status,
    /// Message of the validator that rejected the source
    ValidationOutput,
    /// Compiler diagnostics; empty when compilation succeeded
    CompileOutput,
    /// Standard output of a successful run
    RunOutput,
    /// Diagnostics of a failed run
    RunError,
    /// How much of `RunOutput` a poller has consumed
    RunOutputIndex,
    /// Set by an external actor to request cancellation
    Canceled,
}

impl Slot {
    /// Cache key of the slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::ValidationOutput => "VALIDATION_OUTPUT",
            Self::CompileOutput => "COMPILE_OUTPUT",
            Self::RunOutput => "RUN_OUTPUT",
            Self::RunError => "RUN_ERROR",
            Self::RunOutputIndex => "RUN_OUTPUT_INDEX",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value stored in a slot, tagged by the slot it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "slot", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotValue {
    /// Processing status
    Status(Status),
    /// Validation failure message
    ValidationOutput(String),
    /// Compiler diagnostics
    CompileOutput(String),
    /// Run output
    RunOutput(String),
    /// Run diagnostics
    RunError(String),
    /// Consumed length of the run output
    RunOutputIndex(usize),
    /// Cancellation request flag
    Canceled(bool),
}

impl SlotValue {
    /// Slot this value is stored under.
    pub fn slot(&self) -> Slot {
        match self {
            Self::Status(_) => Slot::Status,
            Self::ValidationOutput(_) => Slot::ValidationOutput,
            Self::CompileOutput(_) => Slot::CompileOutput,
            Self::RunOutput(_) => Slot::RunOutput,
            Self::RunError(_) => Slot::RunError,
            Self::RunOutputIndex(_) => Slot::RunOutputIndex,
            Self::Canceled(_) => Slot::Canceled,
        }
    }

    /// Borrow the text of a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::ValidationOutput(s)
            | Self::CompileOutput(s)
            | Self::RunOutput(s)
            | Self::RunError(s) => Some(s),
            _ => None,
        }
    }
}

/// Storage for pipeline records.
///
/// Implementations must isolate records per [`PipelineId`] and be safe to
/// use from many pipelines at once. Eviction is the implementation's
/// business; the pipeline only asks for an expiration once it is done.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` in its slot, replacing any previous value.
    async fn set_value(&self, id: PipelineId, value: SlotValue) -> Result<(), CacheError>;

    /// Read a slot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] if the slot was never written.
    async fn get_value(&self, id: PipelineId, slot: Slot) -> Result<SlotValue, CacheError>;

    /// Let the whole record expire `ttl` from now.
    async fn set_expiration(&self, id: PipelineId, ttl: Duration) -> Result<(), CacheError>;

    /// Drop the whole record.
    async fn remove(&self, id: PipelineId) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_knows_its_slot() {
        assert_eq!(SlotValue::Status(Status::Finished).slot(), Slot::Status);
        assert_eq!(SlotValue::RunOutput(String::new()).slot(), Slot::RunOutput);
        assert_eq!(SlotValue::RunOutputIndex(3).slot(), Slot::RunOutputIndex);
        assert_eq!(SlotValue::Canceled(true).slot(), Slot::Canceled);
    }

    #[test]
    fn test_only_text_values_borrow_text() {
        assert_eq!(SlotValue::RunError("boom".into()).as_text(), Some("boom"));
        assert_eq!(SlotValue::CompileOutput(String::new()).as_text(), Some(""));
        assert!(SlotValue::Status(Status::Finished).as_text().is_none());
        assert!(SlotValue::RunOutputIndex(3).as_text().is_none());
    }

    #[test]
    fn test_slot_value_serde_is_tagged() {
        let json = serde_json::to_value(SlotValue::RunOutputIndex(2)).unwrap();
        assert_eq!(json["slot"], "RUN_OUTPUT_INDEX");
        assert_eq!(json["value"], 2);
    }
}
