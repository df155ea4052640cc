//! Local process adapter.
//!
//! Spawns the configured command, writes the rendered prompt to stdin and
//! returns stdout. The child is spawned with `kill_on_drop`, so a deadline or
//! cancellation that drops the wait future also kills the process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use coordination::errors::{FailureKind, InvocationFailure};
use coordination::invocation::InvocationRequest;
use coordination::registry::{ProviderConfig, ProviderKind};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ProviderAdapter;

/// Lines of stderr kept on a non-zero exit.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct ProcessAdapter;

impl ProcessAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, request: &InvocationRequest) -> Result<String, InvocationFailure> {
        let model_id = request.model_id();
        let ProviderConfig::LocalProcess { command, args } = request.model.provider() else {
            return Err(InvocationFailure::new(
                FailureKind::InvalidModelConfig,
                model_id,
                "descriptor is not a local process model",
            ));
        };

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InvocationFailure::new(
                    FailureKind::ProcessSpawnError,
                    model_id,
                    format!("failed to start `{command}`: {e}"),
                )
            })?;
        debug!(model_id, command = %command, pid = ?child.id(), "process spawned");

        // Feed stdin while draining stdout so large prompts cannot deadlock
        // against a full output pipe.
        let input = request.render();
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        if let Err(e) = fed {
            // Commands that ignore stdin close it early; the exit status decides.
            debug!(model_id, error = %e, "stdin not fully consumed");
        }
        let output = output.map_err(|e| {
            InvocationFailure::new(
                FailureKind::ProcessNonZeroExit,
                model_id,
                format!("failed to collect output of `{command}`: {e}"),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InvocationFailure::new(
                FailureKind::ProcessNonZeroExit,
                model_id,
                format!("`{command}` exited with {}: {}", output.status, stderr_tail(&stderr)),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(InvocationFailure::new(
                FailureKind::MalformedResponse,
                model_id,
                format!("`{command}` produced no output"),
            ));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ProviderAdapter for ProcessAdapter {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::LocalProcess
    }

    async fn invoke(
        &self,
        request: &InvocationRequest,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, InvocationFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(InvocationFailure::cancelled(request.model_id())),
            outcome = tokio::time::timeout(deadline, self.run(request)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(InvocationFailure::new(
                    FailureKind::ProcessTimeout,
                    request.model_id(),
                    format!("process did not finish within {}s", deadline.as_secs_f64()),
                )),
            },
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.is_empty() {
        "(no stderr)".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
        assert_eq!(stderr_tail("   \n"), "(no stderr)");
    }
}
