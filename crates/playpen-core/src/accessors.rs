//! Read side of a pipeline's cache record.
//!
//! Accessors are pure reads. They distinguish "not written yet"
//! ([`AccessError::NotFound`]) from "wrong slot for this accessor"
//! ([`AccessError::TypeConversion`]) so a poller knows whether to retry.

use crate::cache::{Cache, Slot, SlotValue};
use crate::error::AccessError;
use crate::types::{PipelineId, Status};

/// Read the pipeline's status.
pub async fn get_processing_status(
    cache: &dyn Cache,
    id: PipelineId,
) -> Result<Status, AccessError> {
    match cache.get_value(id, Slot::Status).await? {
        SlotValue::Status(status) => Ok(status),
        _ => Err(AccessError::TypeConversion {
            slot: Slot::Status,
            expected: "status",
        }),
    }
}

/// Read a text slot such as [`Slot::RunOutput`].
///
/// # Errors
///
/// Returns [`AccessError::NotFound`] when the slot was never written, and
/// [`AccessError::TypeConversion`] when it holds something other than text.
pub async fn get_processing_output(
    cache: &dyn Cache,
    id: PipelineId,
    slot: Slot,
) -> Result<String, AccessError> {
    let value = cache.get_value(id, slot).await?;
    value
        .as_text()
        .map(str::to_string)
        .ok_or(AccessError::TypeConversion {
            slot,
            expected: "text",
        })
}

/// Read an index slot such as [`Slot::RunOutputIndex`].
///
/// # Errors
///
/// Returns [`AccessError::NotFound`] when the slot was never written, and
/// [`AccessError::TypeConversion`] when it holds something other than an
/// index.
pub async fn get_last_index(
    cache: &dyn Cache,
    id: PipelineId,
    slot: Slot,
) -> Result<usize, AccessError> {
    match cache.get_value(id, slot).await? {
        SlotValue::RunOutputIndex(index) => Ok(index),
        _ => Err(AccessError::TypeConversion {
            slot,
            expected: "index",
        }),
    }
}

/// Incremental reader over a pipeline's run output.
///
/// Each [`poll`](Self::poll) returns only the output appended since the
/// previous poll. The cursor is consumer state; several consumers of one
/// pipeline each keep their own.
#[derive(Debug, Clone)]
pub struct OutputCursor {
    id: PipelineId,
    slot: Slot,
    offset: usize,
}

impl OutputCursor {
    /// Cursor over [`Slot::RunOutput`], starting at the beginning.
    pub fn new(id: PipelineId) -> Self {
        Self::for_slot(id, Slot::RunOutput)
    }

    /// Cursor over any text slot.
    pub fn for_slot(id: PipelineId, slot: Slot) -> Self {
        Self { id, slot, offset: 0 }
    }

    /// Start from a stored index, e.g. one read with [`get_last_index`].
    pub fn starting_at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Fetch output appended since the last poll.
    ///
    /// An absent slot yields an empty delta. If the stored text is shorter
    /// than the offset, the cursor restarts from the beginning.
    pub async fn poll(&mut self, cache: &dyn Cache) -> Result<String, AccessError> {
        let text = match get_processing_output(cache, self.id, self.slot).await {
            Ok(text) => text,
            Err(e) if e.is_not_found() => return Ok(String::new()),
            Err(e) => return Err(e),
        };
        if text.len() < self.offset || !text.is_char_boundary(self.offset) {
            self.offset = 0;
        }
        let delta = text[self.offset..].to_string();
        self.offset = text.len();
        Ok(delta)
    }
}
