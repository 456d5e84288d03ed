//! Deadline and cancellation coordination.
//!
//! Two abort sources feed one [`ExecutionContext`]: the pipeline deadline,
//! and its cancellation token. The token is cancelled by the caller (a
//! co-located cancel) or by a [`CancelWatcher`] that polls the cache's
//! `Canceled` slot on behalf of another process. The context reports which
//! source fired through [`AbortReason`]; no wall-clock comparison is involved.

use crate::cache::{Cache, Slot, SlotValue};
use crate::types::PipelineId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an execution context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The pipeline deadline elapsed.
    DeadlineExceeded,
    /// The context's token was cancelled.
    Canceled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Deadline plus cancellation token bounding one pipeline.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    deadline: Instant,
    token: CancellationToken,
}

impl ExecutionContext {
    /// Derive a context that expires `timeout` from now and is cancelled
    /// whenever `parent` is.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            token: parent.child_token(),
        }
    }

    /// Token that aborts this context when cancelled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reason the context is done, if it is.
    ///
    /// The deadline is checked first so that an elapsed deadline wins over a
    /// cancel that raced with it.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        if Instant::now() >= self.deadline {
            Some(AbortReason::DeadlineExceeded)
        } else if self.token.is_cancelled() {
            Some(AbortReason::Canceled)
        } else {
            None
        }
    }

    /// Wait until the context is done.
    pub async fn aborted(&self) -> AbortReason {
        if let Some(reason) = self.abort_reason() {
            return reason;
        }
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(self.deadline) => AbortReason::DeadlineExceeded,
            _ = self.token.cancelled() => AbortReason::Canceled,
        }
    }

    /// Run `fut` unless the context finishes first.
    pub async fn run<F: std::future::Future>(&self, fut: F) -> Result<F::Output, AbortReason> {
        if let Some(reason) = self.abort_reason() {
            return Err(reason);
        }
        tokio::select! {
            biased;
            reason = self.aborted() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

/// Background task that cancels a context once the cache's `Canceled`
/// slot reads `true`.
///
/// The watcher lives for one stage. [`finish`](Self::finish) stops it and
/// waits for the task to exit, so it never outlives the stage that spawned
/// it.
#[derive(Debug)]
pub struct CancelWatcher {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl CancelWatcher {
    /// Start polling `Canceled` for `id` every `interval`.
    pub fn spawn(
        cache: Arc<dyn Cache>,
        id: PipelineId,
        ctx: &ExecutionContext,
        interval: Duration,
    ) -> Self {
        let stop = CancellationToken::new();
        let target = ctx.token().clone();
        let handle = tokio::spawn(Self::watch(cache, id, target, stop.clone(), interval));
        tracing::trace!(pipeline_id = %id, interval_ms = interval.as_millis() as u64, "Cancel watcher started");
        Self { stop, handle }
    }

    async fn watch(
        cache: Arc<dyn Cache>,
        id: PipelineId,
        target: CancellationToken,
        stop: CancellationToken,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = target.cancelled() => break,
                _ = ticker.tick() => {
                    match cache.get_value(id, Slot::Canceled).await {
                        Ok(SlotValue::Canceled(true)) => {
                            tracing::info!(pipeline_id = %id, "Cancel requested");
                            target.cancel();
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::trace!(pipeline_id = %id, error = %e, "Cancel flag not readable");
                        }
                    }
                }
            }
        }
        tracing::trace!(pipeline_id = %id, "Cancel watcher exited");
    }

    /// Stop polling and wait for the task to exit.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = ?e, "Cancel watcher panicked");
        }
    }
}
