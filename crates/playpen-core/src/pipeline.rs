//! Pipeline orchestration.
//!
//! [`process`] drives one pipeline through validation, compilation and
//! execution, recording every result in the cache. It returns nothing: the
//! cache is the only output, read back through the accessors.
//!
//! ```text
//! VALIDATING ──▶ COMPILING ──▶ EXECUTING ──▶ FINISHED
//!     │              │             │
//!     ▼              ▼             ├──▶ RUN_ERROR
//! VALIDATION_ERROR  COMPILE_ERROR  │
//!                                  └──▶ RUN_TIMEOUT / CANCELED (any stage)
//! ```

use crate::backend::Backend;
use crate::cache::{Cache, SlotValue};
use crate::coordinator::{AbortReason, CancelWatcher, ExecutionContext};
use crate::environment::ApplicationEnvironment;
use crate::error::{CacheError, ValidationError};
use crate::executor::{parse_pipeline_options, Executor, ExecutorBuilder};
use crate::lifecycle::LifeCycle;
use crate::stage::{run_stage, StageOutcome};
use crate::types::{PipelineId, Status};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Single writer of one pipeline's cache record.
///
/// Status writes must follow [`Status::can_transition_to`]; anything
/// written after a terminal status is dropped.
struct StatusRecorder {
    cache: Arc<dyn Cache>,
    id: PipelineId,
    current: Status,
}

impl StatusRecorder {
    fn new(cache: Arc<dyn Cache>, id: PipelineId) -> Self {
        Self {
            cache,
            id,
            current: Status::Unspecified,
        }
    }

    fn current(&self) -> Status {
        self.current
    }

    async fn status(&mut self, next: Status) -> Result<(), CacheError> {
        if !self.current.can_transition_to(next) {
            warn!(
                pipeline_id = %self.id,
                current = %self.current,
                rejected = %next,
                "Status write rejected"
            );
            return Ok(());
        }
        self.cache.set_value(self.id, SlotValue::Status(next)).await?;
        self.current = next;
        info!(pipeline_id = %self.id, status = %next, "Status changed");
        Ok(())
    }

    async fn value(&self, value: SlotValue) -> Result<(), CacheError> {
        if self.current.is_terminal() {
            warn!(
                pipeline_id = %self.id,
                slot = %value.slot(),
                status = %self.current,
                "Write after terminal status dropped"
            );
            return Ok(());
        }
        debug!(pipeline_id = %self.id, slot = %value.slot(), "Cache write");
        self.cache.set_value(self.id, value).await
    }

    async fn aborted(&mut self, reason: AbortReason) -> Result<(), CacheError> {
        let status = match reason {
            AbortReason::DeadlineExceeded => Status::RunTimeout,
            AbortReason::Canceled => Status::Canceled,
        };
        self.status(status).await
    }
}

/// Run one pipeline to completion.
///
/// `ctx` is the caller's token: cancelling it is recorded as `CANCELED`,
/// the same as a `Canceled` flag written to the cache by another process.
/// The pipeline deadline is `app_env.pipeline_timeout`, measured from the
/// call, and races every stage including validation.
///
/// The source must already be prepared with
/// [`prepare`](crate::lifecycle::prepare). Once a terminal status is
/// recorded the record expires after `app_env.key_expiration`.
pub async fn process(
    ctx: &CancellationToken,
    cache: Arc<dyn Cache>,
    lc: &LifeCycle,
    id: PipelineId,
    app_env: &ApplicationEnvironment,
    backend: &dyn Backend,
    pipeline_options: &str,
) {
    let started = Instant::now();
    let exec_ctx = ExecutionContext::with_timeout(ctx, app_env.pipeline_timeout);
    let mut recorder = StatusRecorder::new(Arc::clone(&cache), id);

    if let Err(e) = run_pipeline(&mut recorder, &exec_ctx, lc, app_env, backend, pipeline_options).await {
        error!(pipeline_id = %id, error = %e, "Pipeline aborted by cache failure");
    }

    let status = recorder.current();
    if status.is_terminal() {
        if let Err(e) = cache.set_expiration(id, app_env.key_expiration).await {
            warn!(pipeline_id = %id, error = %e, "Failed to set record expiration");
        }
    }
    info!(
        pipeline_id = %id,
        status = %status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Pipeline processed"
    );
}

async fn run_pipeline(
    recorder: &mut StatusRecorder,
    ctx: &ExecutionContext,
    lc: &LifeCycle,
    app_env: &ApplicationEnvironment,
    backend: &dyn Backend,
    pipeline_options: &str,
) -> Result<(), CacheError> {
    let id = recorder.id;
    recorder.status(Status::Validating).await?;
    if let Some(reason) = ctx.abort_reason() {
        return recorder.aborted(reason).await;
    }

    let validators = backend.validators();
    let source = lc.absolute_source_file_path().to_path_buf();
    let validation = ctx
        .run(tokio::task::spawn_blocking(move || validators.run(&source)))
        .await;
    let validation = match validation {
        Ok(joined) => joined.unwrap_or_else(|e| {
            Err(ValidationError::Io(io::Error::new(io::ErrorKind::Other, e)))
        }),
        // The blocking validator is left to finish on its own.
        Err(reason) => return recorder.aborted(reason).await,
    };
    if let Some(reason) = ctx.abort_reason() {
        return recorder.aborted(reason).await;
    }
    let results = match validation {
        Ok(results) => results,
        Err(e) => {
            info!(pipeline_id = %id, error = %e, "Validation failed");
            recorder.value(SlotValue::ValidationOutput(e.to_string())).await?;
            return recorder.status(Status::ValidationError).await;
        }
    };

    let options = parse_pipeline_options(pipeline_options);
    let builder = backend.executor_builder(lc, &options);

    let executor = match compile(recorder, ctx, lc, backend, builder).await? {
        Some(executor) => executor,
        None => return Ok(()),
    };

    let unit_test = results.is_unit_test();
    let invocation = executor.select(unit_test);
    debug!(pipeline_id = %id, unit_test, command = %invocation, "Stage selected");

    recorder.status(Status::Executing).await?;
    recorder.value(SlotValue::RunOutputIndex(0)).await?;

    let watcher = CancelWatcher::spawn(
        Arc::clone(&recorder.cache),
        id,
        ctx,
        app_env.cancel_poll_interval,
    );
    let outcome = run_stage(invocation, ctx).await;
    watcher.finish().await;

    // An abort that fired while the child was exiting still wins.
    if let Some(reason) = ctx.abort_reason() {
        return recorder.aborted(reason).await;
    }

    match outcome {
        Ok(StageOutcome::Aborted(reason)) => recorder.aborted(reason).await,
        Ok(StageOutcome::Exited(output)) if output.success() => {
            recorder.value(SlotValue::RunOutput(output.stdout)).await?;
            recorder.status(Status::Finished).await
        }
        Ok(StageOutcome::Exited(output)) => {
            info!(pipeline_id = %id, exit_code = output.exit_code, "Run failed");
            recorder.value(SlotValue::RunOutput(String::new())).await?;
            recorder
                .value(SlotValue::RunError(output.error_message(&output.stderr)))
                .await?;
            recorder.status(Status::RunError).await
        }
        Err(e) => {
            warn!(pipeline_id = %id, error = %e, command = %invocation, "Run command failed to start");
            recorder.value(SlotValue::RunOutput(String::new())).await?;
            recorder.value(SlotValue::RunError(format!("error: {e}"))).await?;
            recorder.status(Status::RunError).await
        }
    }
}

/// Compile if the backend has a compile step and bind the artifact name.
///
/// Returns `None` when a terminal status was recorded.
async fn compile(
    recorder: &mut StatusRecorder,
    ctx: &ExecutionContext,
    lc: &LifeCycle,
    backend: &dyn Backend,
    builder: ExecutorBuilder,
) -> Result<Option<Executor>, CacheError> {
    let id = recorder.id;
    let executor = match builder.build() {
        Ok(executor) => executor,
        Err(e) => {
            error!(pipeline_id = %id, error = %e, "Executor could not be built");
            return compile_failed(recorder, format!("error: {e}")).await;
        }
    };

    let Some(invocation) = executor.compile() else {
        return Ok(Some(executor));
    };

    recorder.status(Status::Compiling).await?;
    let outcome = run_stage(invocation, ctx).await;
    if let Some(reason) = ctx.abort_reason() {
        recorder.aborted(reason).await?;
        return Ok(None);
    }

    match outcome {
        Ok(StageOutcome::Aborted(reason)) => {
            recorder.aborted(reason).await?;
            return Ok(None);
        }
        Ok(StageOutcome::Exited(output)) if !output.success() => {
            info!(pipeline_id = %id, exit_code = output.exit_code, "Compilation failed");
            let text = format!("{}{}", output.stdout, output.stderr);
            return compile_failed(recorder, output.error_message(&text)).await;
        }
        Ok(StageOutcome::Exited(_)) => {}
        Err(e) => {
            warn!(pipeline_id = %id, error = %e, command = %invocation, "Compile command failed to start");
            return compile_failed(recorder, format!("error: {e}")).await;
        }
    }
    recorder.value(SlotValue::CompileOutput(String::new())).await?;

    if !backend.needs_artifact_name() || builder.has_executable_name() {
        return Ok(Some(executor));
    }
    let name = match backend.resolve_artifact_name(lc).await {
        Ok(name) => name,
        Err(e) => {
            warn!(pipeline_id = %id, error = %e, "Compiled artifact not found");
            return compile_failed(recorder, format!("error: {e}")).await;
        }
    };
    debug!(pipeline_id = %id, executable = %name, "Artifact name resolved");
    match builder.executable_name(name).build() {
        Ok(executor) => Ok(Some(executor)),
        Err(e) => compile_failed(recorder, format!("error: {e}")).await,
    }
}

async fn compile_failed(
    recorder: &mut StatusRecorder,
    message: String,
) -> Result<Option<Executor>, CacheError> {
    if recorder.current() == Status::Validating {
        recorder.status(Status::Compiling).await?;
    }
    recorder.value(SlotValue::CompileOutput(message)).await?;
    recorder.status(Status::CompileError).await?;
    Ok(None)
}
