//! # playpen-core
//!
//! Code processing pipeline for the playpen sandbox.
//!
//! A pipeline takes one submitted source file through validation,
//! compilation and execution, bounded by a deadline and cancellable from
//! another process. Results are never returned directly: every stage writes
//! into a per-pipeline cache record that clients poll.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     process() task                       │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │  ValidatorSet   │────▶│  ValidationResults       │   │
//! │  └─────────────────┘     │  ("UnitTest" verdict)    │   │
//! │           │              └──────────────────────────┘   │
//! │           ▼                                              │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ dyn Backend     │────▶│  ExecutorBuilder         │   │
//! │  │ Java/Go/Py/Sh   │     │   -> Executor            │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │           │                           │                  │
//! │           ▼                           ▼                  │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │ExecutionContext │◀────│  CancelWatcher           │   │
//! │  │ deadline+token  │     │  (polls CANCELED)        │   │
//! │  └─────────────────┘     └──────────────────────────┘   │
//! │           │ kill on abort                                │
//! │           ▼                                              │
//! │  ┌─────────────────┐                                    │
//! │  │  child process  │                                    │
//! │  └─────────────────┘                                    │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │ SlotValue writes
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │              dyn Cache (LocalCache, ...)                 │
//! │   STATUS, COMPILE_OUTPUT, RUN_OUTPUT, RUN_ERROR, ...     │
//! └──────────────────────────────────────────────────────────┘
//!                           ▲
//!                           │ get_processing_status / OutputCursor
//!                        pollers
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use playpen_core::{
//!     backend_for, get_processing_output, get_processing_status, prepare, process,
//!     ApplicationEnvironment, Cache, LocalCache, PipelineId, SdkEnvironment, SdkKind, Slot,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> playpen_core::Result<()> {
//! let app_env = ApplicationEnvironment::new("/tmp/playpen");
//! let backend = backend_for(SdkEnvironment::defaults(SdkKind::Shell));
//! let cache: Arc<dyn Cache> = Arc::new(LocalCache::new());
//!
//! let id = PipelineId::new();
//! let lc = prepare(SdkKind::Shell, id, &app_env.working_dir, "echo 'Hello world!'").await?;
//!
//! process(&CancellationToken::new(), cache.clone(), &lc, id, &app_env, backend.as_ref(), "").await;
//!
//! let status = get_processing_status(cache.as_ref(), id).await;
//! let output = get_processing_output(cache.as_ref(), id, Slot::RunOutput).await;
//! println!("{status:?}: {output:?}");
//!
//! lc.delete_folders().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Typed cache slots**: a slot can only hold its own value shape
//! - **Deadline and cancel**: both abort sources kill the running child
//! - **Pluggable backends**: one `Backend` value per language
//! - **Incremental output**: `OutputCursor` returns only new run output

mod accessors;
mod backend;
mod cache;
mod coordinator;
mod environment;
mod error;
mod executor;
mod lifecycle;
mod pipeline;
mod stage;
mod types;
mod validators;

pub use accessors::{get_last_index, get_processing_output, get_processing_status, OutputCursor};
pub use backend::{backend_for, Backend, GoBackend, JavaBackend, PythonBackend, ShellBackend};
pub use cache::{Cache, LocalCache, Slot, SlotValue};
pub use coordinator::{AbortReason, CancelWatcher, ExecutionContext};
pub use environment::{
    ApplicationEnvironment, CommandConfig, SdkEnvironment, SdkKind, DEFAULT_CANCEL_POLL_INTERVAL,
    DEFAULT_KEY_EXPIRATION, DEFAULT_PIPELINE_TIMEOUT,
};
pub use error::{
    AccessError, BuildError, CacheError, ConfigError, CoreError, Result, ValidationError,
};
pub use executor::{parse_pipeline_options, Executor, ExecutorBuilder, Invocation, StageBuilder};
pub use lifecycle::{prepare, ExecutableNameResolver, LifeCycle, BASE_FILES_FOLDER};
pub use pipeline::process;
pub use stage::{run_stage, StageOutcome, StageOutput};
pub use types::{PipelineId, Status};
pub use validators::{
    FileExtension, SourceExists, UnitTest, ValidationResults, Validator, ValidatorSet,
    UNIT_TEST_VALIDATOR,
};
