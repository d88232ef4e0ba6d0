//! Child process execution with bounded timeouts.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long to keep draining pipes after the child exits.
///
/// Background processes the child spawned (build servers, MSBuild nodes) may
/// inherit the pipes and hold them open long after the child is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(250);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Captured output of a finished child process.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,

    /// Captured stdout (lossy UTF-8).
    pub stdout: String,

    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
}

/// Error types for running a child process.
#[derive(Debug, Error)]
pub enum RunError {
    /// The program is not installed or not on PATH.
    #[error("{0} not found on PATH")]
    NotFound(String),

    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// The program exceeded its time budget and was killed.
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// Waiting on the program failed.
    #[error("failed to wait on {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

/// Background task collecting one output pipe into a shared buffer.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CommandOutput {
    /// Stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// Exit code for messages (`-1` when killed by a signal).
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buffer, task }
    }

    /// Wait up to `grace` for end of stream, then take whatever was read.
    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            tracing::debug!("Output pipe still held open after exit, detaching");
        }
        let bytes = std::mem::take(&mut *lock(&self.buffer));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Run `program args...` in `cwd`, capturing output, killing it after `timeout`.
pub async fn run_captured<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    // Keep dotnet quiet and deterministic, and stop MSBuild leaving nodes behind
    cmd.env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
        .env("DOTNET_NOLOGO", "1")
        .env("MSBUILDDISABLENODEREUSE", "1")
        .env("GIT_TERMINAL_PROMPT", "0");

    tracing::debug!("Running {} (timeout {}s)", program, timeout.as_secs());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunError::NotFound(program.to_string())
        } else {
            RunError::Spawn {
                program: program.to_string(),
                source: e,
            }
        }
    })?;

    let stdout = PipeReader::spawn(child.stdout.take());
    let stderr = PipeReader::spawn(child.stderr.take());

    // Returning early drops the child, which kills it
    let status = tokio::time::timeout(timeout, child.wait())
        .await
        .map_err(|_| RunError::TimedOut {
            program: program.to_string(),
            timeout,
        })?
        .map_err(|e| RunError::Wait {
            program: program.to_string(),
            source: e,
        })?;

    Ok(CommandOutput {
        status,
        stdout: stdout.finish(PIPE_DRAIN_GRACE).await,
        stderr: stderr.finish(PIPE_DRAIN_GRACE).await,
    })
}

/// Last `n` non-empty lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        let text = "a\n\nb\nc\n  \nd\n";
        assert_eq!(tail_lines(text, 2), "c\nd");
        assert_eq!(tail_lines(text, 10), "a\nb\nc\nd");
        assert_eq!(tail_lines("", 3), "");
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let result = run_captured(
            "ext-forge-definitely-missing-program",
            ["--version"],
            None,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(RunError::NotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_status() {
        let output = run_captured(
            "sh",
            ["-c", "echo out; echo err >&2; exit 3"],
            None,
            Duration::from_secs(10),
        )
        .await
        .unwrap();

        assert_eq!(output.code(), 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let result = run_captured("sh", ["-c", "sleep 5"], None, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(RunError::TimedOut { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_returns_when_background_process_holds_pipes() {
        let started = std::time::Instant::now();
        let output = run_captured(
            "sh",
            ["-c", "sleep 3 & echo published; exit 0"],
            None,
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "published");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_server_env_is_set() {
        let output = run_captured(
            "sh",
            ["-c", "echo $MSBUILDDISABLENODEREUSE"],
            None,
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(output.stdout.trim(), "1");
    }
}
