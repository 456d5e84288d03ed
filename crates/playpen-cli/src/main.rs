//! Playpen command-line driver.
//!
//! Prepares one pipeline from a local source file, runs it as a background
//! task and polls the cache the way a remote client would, streaming new
//! run output to stdout. Logs go to stderr.
//!
//! ```text
//! playpen run hello.sh --sdk shell
//! PLAYPEN_SDK=SDK_JAVA playpen run HelloWorld.java --options "--verbose"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use playpen_core::{
    backend_for, get_processing_output, get_processing_status, prepare, process,
    ApplicationEnvironment, Cache, LocalCache, OutputCursor, PipelineId, SdkKind, Slot, Status,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate, compile and run a source file in a playpen pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one source file through the pipeline
    Run {
        /// Source file to submit
        file: PathBuf,

        /// Backend to use (java, go, python, shell); overrides PLAYPEN_SDK
        #[arg(long)]
        sdk: Option<SdkKind>,

        /// Pipeline options appended to the run command
        #[arg(long, default_value = "")]
        options: String,

        /// Status poll interval in milliseconds
        #[arg(long, default_value_t = 200)]
        poll_ms: u64,

        /// Pipeline deadline in seconds; overrides PLAYPEN_PIPELINE_TIMEOUT_SECS
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("pipeline {id} ended with {status}")]
    Unsuccessful { id: PipelineId, status: Status },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("playpen=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            sdk,
            options,
            poll_ms,
            timeout_secs,
        } => run(file, sdk, options, Duration::from_millis(poll_ms), timeout_secs).await,
    }
}

async fn run(
    file: PathBuf,
    sdk: Option<SdkKind>,
    options: String,
    poll_interval: Duration,
    timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let mut app_env = ApplicationEnvironment::from_env().context("invalid environment")?;
    if let Some(sdk) = sdk {
        app_env.sdk = sdk;
    }
    if let Some(secs) = timeout_secs {
        app_env = app_env.with_pipeline_timeout(Duration::from_secs(secs));
    }
    tracing::info!(?app_env, "Configuration loaded");

    let sdk_env = app_env
        .load_sdk_environment()
        .context("failed to load SDK configuration")?;
    let backend = backend_for(sdk_env);

    let code = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let id = PipelineId::new();
    let lc = prepare(app_env.sdk, id, &app_env.working_dir, &code)
        .await
        .context("failed to prepare pipeline files")?;
    tracing::info!(pipeline_id = %id, sdk = %app_env.sdk, "Pipeline prepared");

    let cache = Arc::new(LocalCache::new());
    let token = CancellationToken::new();

    let task = {
        let cache: Arc<dyn Cache> = cache.clone();
        let token = token.clone();
        let lc = lc.clone();
        let app_env = app_env.clone();
        tokio::spawn(async move {
            process(&token, cache, &lc, id, &app_env, backend.as_ref(), &options).await;
        })
    };

    let status = poll(cache.as_ref(), id, &token, poll_interval, &task).await;
    if let Err(e) = task.await {
        tracing::error!(error = ?e, "Pipeline task panicked");
    }
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            cleanup(&lc).await;
            return Err(e);
        }
    };

    report(cache.as_ref(), id, status).await;
    cleanup(&lc).await;

    if status == Status::Finished {
        Ok(())
    } else {
        Err(CliError::Unsuccessful { id, status }.into())
    }
}

/// Poll until a terminal status appears, streaming run output.
///
/// Ctrl-C cancels the pipeline; polling continues until the cancel is
/// recorded.
async fn poll(
    cache: &dyn Cache,
    id: PipelineId,
    token: &CancellationToken,
    interval: Duration,
    task: &JoinHandle<()>,
) -> anyhow::Result<Status> {
    let mut cursor = OutputCursor::new(id);
    let mut ticker = tokio::time::interval(interval);
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            res = signal::ctrl_c(), if !token.is_cancelled() => {
                res.context("failed to listen for Ctrl-C")?;
                tracing::warn!(pipeline_id = %id, "Interrupted, cancelling pipeline");
                token.cancel();
            }
        }

        let delta = cursor.poll(cache).await?;
        if !delta.is_empty() {
            stdout.write_all(delta.as_bytes())?;
            stdout.flush()?;
        }

        // Sampled before the status read so a final write is never missed.
        let finished = task.is_finished();
        match get_processing_status(cache, id).await {
            Ok(status) if status.is_terminal() => {
                let delta = cursor.poll(cache).await?;
                stdout.write_all(delta.as_bytes())?;
                stdout.flush()?;
                return Ok(status);
            }
            Ok(status) if finished => {
                anyhow::bail!("pipeline {id} stopped at {status}");
            }
            Ok(status) => tracing::debug!(pipeline_id = %id, status = %status, "Polled"),
            Err(e) if e.is_not_found() && finished => {
                anyhow::bail!("pipeline {id} stopped before recording a status");
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
}

/// Print the diagnostics recorded for a failed pipeline to stderr.
async fn report(cache: &dyn Cache, id: PipelineId, status: Status) {
    let slot = match status {
        Status::ValidationError => Slot::ValidationOutput,
        Status::CompileError => Slot::CompileOutput,
        Status::RunError => Slot::RunError,
        _ => return,
    };
    if let Ok(text) = get_processing_output(cache, id, slot).await {
        eprintln!("{text}");
    }
}

async fn cleanup(lc: &playpen_core::LifeCycle) {
    if let Err(e) = lc.delete_folders().await {
        tracing::warn!(pipeline_id = %lc.pipeline_id(), error = %e, "Failed to remove pipeline folders");
    }
}
