//! Child process execution for one pipeline stage.
//!
//! The child is bound to an [`ExecutionContext`]: when the context aborts,
//! the child is killed and reaped before [`run_stage`] returns.

use crate::coordinator::{AbortReason, ExecutionContext};
use crate::executor::Invocation;
use std::io;
use std::process::ExitStatus;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::{debug, trace, warn};

/// Captured result of a child that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub exit_code: i32,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl StageOutput {
    /// Whether the child exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic body recorded for a nonzero exit.
    pub fn error_message(&self, output: &str) -> String {
        format!("error: exit status {}, output: {}", self.exit_code, output)
    }
}

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The child exited on its own.
    Exited(StageOutput),
    /// The context aborted first and the child was killed.
    Aborted(AbortReason),
}

/// Spawn `invocation` and wait for it under `ctx`.
///
/// # Errors
///
/// Returns an error if the child cannot be spawned or its output cannot be
/// read.
pub async fn run_stage(invocation: &Invocation, ctx: &ExecutionContext) -> io::Result<StageOutcome> {
    if let Some(reason) = ctx.abort_reason() {
        return Ok(StageOutcome::Aborted(reason));
    }

    debug!(command = %invocation, "Spawning stage command");
    let mut child = invocation.to_command().spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let completed = tokio::select! {
        biased;
        reason = ctx.aborted() => Err(reason),
        result = collect(&mut child, stdout, stderr) => Ok(result),
    };

    match completed {
        Ok(result) => {
            let (status, stdout, stderr) = result?;
            let output = StageOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            };
            debug!(
                exit_code = output.exit_code,
                stdout_len = output.stdout.len(),
                stderr_len = output.stderr.len(),
                "Stage command completed"
            );
            Ok(StageOutcome::Exited(output))
        }
        Err(reason) => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, command = %invocation, "Failed to kill stage command");
            }
            debug!(reason = %reason, command = %invocation, "Stage command killed");
            Ok(StageOutcome::Aborted(reason))
        }
    }
}

async fn collect(
    child: &mut Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let (stdout, stderr) = tokio::try_join!(read_all(stdout), read_all(stderr))?;
    let status = child.wait().await?;
    trace!(stdout_len = stdout.len(), stderr_len = stderr.len(), "Stage output collected");
    Ok((status, stdout, stderr))
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorBuilder;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn sh(script: &str) -> Invocation {
        ExecutorBuilder::new()
            .runner(|r| r.command("sh").args(["-c", script]))
            .test_runner(|t| t.command("sh"))
            .build()
            .unwrap()
            .run()
            .clone()
    }

    fn ctx(timeout: Duration) -> ExecutionContext {
        ExecutionContext::with_timeout(&CancellationToken::new(), timeout)
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let outcome = run_stage(&sh("echo hello"), &ctx(Duration::from_secs(10)))
            .await
            .unwrap();
        let StageOutcome::Exited(output) = outcome else {
            panic!("expected the command to exit");
        };
        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_and_stderr() {
        let outcome = run_stage(&sh("echo oops >&2; exit 42"), &ctx(Duration::from_secs(10)))
            .await
            .unwrap();
        let StageOutcome::Exited(output) = outcome else {
            panic!("expected the command to exit");
        };
        assert_eq!(output.exit_code, 42);
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(
            output.error_message(&output.stderr),
            "error: exit status 42, output: oops\n"
        );
    }

    #[tokio::test]
    async fn test_deadline_kills_child() {
        let outcome = run_stage(&sh("while true; do :; done"), &ctx(Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Aborted(AbortReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let ctx = ctx(Duration::from_secs(30));
        let canceller = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ctx.cancel();
            })
        };
        let outcome = run_stage(&sh("while true; do :; done"), &ctx).await.unwrap();
        canceller.await.unwrap();
        assert_eq!(outcome, StageOutcome::Aborted(AbortReason::Canceled));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let invocation = ExecutorBuilder::new()
            .runner(|r| r.command("/nonexistent/playpen-binary"))
            .test_runner(|t| t.command("sh"))
            .build()
            .unwrap()
            .run()
            .clone();
        assert!(run_stage(&invocation, &ctx(Duration::from_secs(10))).await.is_err());
    }
}
