//! Subprocess plumbing shared by every adapter: one-shot execution with
//! combined output capture, and a streaming variant for long operations
//! (mkfs/fsck) that feeds stdout/stderr line channels.
//!
//! A non-zero exit code is NOT an error at this layer. Each filesystem tool
//! has its own exit-code taxonomy (fsck.ext4 returns 1 for "errors
//! corrected") and only the owning adapter can interpret it. Hard errors are
//! launch failures (binary missing) and cancellation.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::FsError;

/// Combined, trimmed output of a completed command plus its exit code.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub output: String,
    pub exit_code: i32,
}

/// Terminal result of a streamed command. `error` is set only for launch
/// failures and cancellation; exit-code interpretation is the caller's job.
#[derive(Debug)]
pub struct CommandResult {
    pub exit_code: i32,
    pub error: Option<FsError>,
}

/// Line channels for a streamed command. The result is delivered only after
/// both reader tasks have drained their pipes, so every output line reaches
/// the consumer before the terminal status.
pub struct CommandStream {
    pub stdout: mpsc::Receiver<String>,
    pub stderr: mpsc::Receiver<String>,
    pub result: oneshot::Receiver<CommandResult>,
}

/// Run a command to completion, capturing stdout and stderr together.
pub async fn run_command<S: AsRef<OsStr>>(
    command: S,
    args: &[String],
) -> Result<CommandOutput, FsError> {
    let command_name = command.as_ref().to_string_lossy().into_owned();
    debug!(command = %command_name, ?args, "executing command");

    let output = Command::new(command.as_ref())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| FsError::ToolExecutionFailure {
            command: command_name.clone(),
            exit_code: -1,
            output: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    if exit_code != 0 {
        warn!(command = %command_name, exit_code, "command exited non-zero");
    }

    Ok(CommandOutput {
        output: combined.trim().to_string(),
        exit_code,
    })
}

/// Spawn a command and stream its output.
///
/// Returns immediately with the line channels; a background task waits for
/// the child. Cancelling `token` kills the child and yields
/// [`FsError::Cancelled`] through the result channel. Partial on-disk state
/// is not rolled back.
pub fn spawn_streaming<S: AsRef<OsStr>>(
    token: CancellationToken,
    command: S,
    args: &[String],
) -> CommandStream {
    let command_name = command.as_ref().to_string_lossy().into_owned();
    let (stdout_tx, stdout_rx) = mpsc::channel(100);
    let (stderr_tx, stderr_rx) = mpsc::channel(100);
    let (result_tx, result_rx) = oneshot::channel();

    let spawned = Command::new(command.as_ref())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let _ = result_tx.send(CommandResult {
                exit_code: -1,
                error: Some(FsError::ToolExecutionFailure {
                    command: command_name,
                    exit_code: -1,
                    output: e.to_string(),
                }),
            });
            return CommandStream {
                stdout: stdout_rx,
                stderr: stderr_rx,
                result: result_rx,
            };
        }
    };

    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(forward_lines(pipe, stdout_tx)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(forward_lines(pipe, stderr_tx)));

    tokio::spawn(async move {
        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(command = %command_name, "cancellation requested, killing child");
                let _ = child.kill().await;
                CommandResult {
                    exit_code: -1,
                    error: Some(FsError::Cancelled(command_name.clone())),
                }
            }
            status = child.wait() => match status {
                Ok(status) => CommandResult {
                    exit_code: status.code().unwrap_or(-1),
                    error: None,
                },
                Err(e) => CommandResult {
                    exit_code: -1,
                    error: Some(FsError::Io(e)),
                },
            },
        };

        // Barrier: readers finish before the terminal result is observable.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        let _ = result_tx.send(result);
    });

    CommandStream {
        stdout: stdout_rx,
        stderr: stderr_rx,
        result: result_rx,
    }
}

async fn forward_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_command_captures_output_and_exit_code() {
        let out = run_command("sh", &["-c".into(), "echo hello; exit 3".into()])
            .await
            .unwrap();
        assert_eq!(out.output, "hello");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn run_command_combines_stderr() {
        let out = run_command("sh", &["-c".into(), "echo out; echo err >&2".into()])
            .await
            .unwrap();
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn run_command_missing_binary_is_hard_error() {
        let err = run_command("definitely-not-a-real-tool-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::ToolExecutionFailure { .. }));
    }

    #[tokio::test]
    async fn streaming_delivers_lines_before_result() {
        let token = CancellationToken::new();
        let mut stream = spawn_streaming(
            token,
            "sh",
            &["-c".into(), "echo one; echo two; echo three >&2".into()],
        );

        let mut stdout_lines = Vec::new();
        while let Some(line) = stream.stdout.recv().await {
            stdout_lines.push(line);
        }
        let mut stderr_lines = Vec::new();
        while let Some(line) = stream.stderr.recv().await {
            stderr_lines.push(line);
        }

        let result = stream.result.await.unwrap();
        assert_eq!(stdout_lines, vec!["one", "two"]);
        assert_eq!(stderr_lines, vec!["three"]);
        assert_eq!(result.exit_code, 0);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn streaming_reports_tool_exit_code() {
        let token = CancellationToken::new();
        let mut stream = spawn_streaming(token, "sh", &["-c".into(), "exit 4".into()]);
        while stream.stdout.recv().await.is_some() {}
        while stream.stderr.recv().await.is_some() {}
        let result = stream.result.await.unwrap();
        assert_eq!(result.exit_code, 4);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let token = CancellationToken::new();
        let mut stream = spawn_streaming(token.clone(), "sleep", &["30".into()]);
        token.cancel();
        while stream.stdout.recv().await.is_some() {}
        while stream.stderr.recv().await.is_some() {}
        let result = stream.result.await.unwrap();
        assert!(matches!(result.error, Some(FsError::Cancelled(_))));
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_through_result_channel() {
        let token = CancellationToken::new();
        let mut stream = spawn_streaming(token, "definitely-not-a-real-tool-xyz", &[]);
        while stream.stdout.recv().await.is_some() {}
        while stream.stderr.recv().await.is_some() {}
        let result = stream.result.await.unwrap();
        assert_eq!(result.exit_code, -1);
        assert!(matches!(
            result.error,
            Some(FsError::ToolExecutionFailure { .. })
        ));
    }
}
