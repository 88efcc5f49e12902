//! External command execution with timeout and bounded retries.
//!
//! Commands are spawned with `tokio::process::Command` and `kill_on_drop`, so
//! a timed-out child is killed when its future is dropped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use super::types::{Task, TaskOutcome};
use crate::error::{Error, Result};
use crate::util::tail;
use crate::{clog_debug, clog_trace, clog_warn};

/// Captured output is truncated to this many trailing characters.
const MAX_CAPTURED_CHARS: usize = 64 * 1024;

/// Raw result of a single command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Best human-readable reason for a non-zero exit.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Resolve a bare program name on `PATH`. Paths are returned unchanged.
fn resolve_program(command: &str) -> Result<PathBuf> {
    if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        return Ok(PathBuf::from(command));
    }
    which::which(command).map_err(|_| Error::CommandNotFound(command.to_string()))
}

/// Run one command to completion or until `timeout` elapses.
pub async fn run_command(
    command: &str,
    args: &[String],
    timeout: Duration,
    working_dir: Option<&Path>,
) -> Result<CommandOutput> {
    let program = resolve_program(command)?;

    let mut cmd = Command::new(&program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| Error::Timeout(timeout))?
        .map_err(Error::Io)?;

    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: tail(&String::from_utf8_lossy(&output.stdout), MAX_CAPTURED_CHARS),
        stderr: tail(&String::from_utf8_lossy(&output.stderr), MAX_CAPTURED_CHARS),
        duration: start.elapsed(),
    };
    clog_trace!(
        "run_command {} exit={:?} stdout={:?}",
        command,
        result.exit_code,
        result.stdout
    );
    Ok(result)
}

/// Runs tasks as child processes.
///
/// Holds no state between calls beyond its settings.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    working_dir: Option<PathBuf>,
    retry_delay: Duration,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Pause between failed attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Execute `task`, retrying until an attempt exits 0 or attempts run out.
    ///
    /// Never returns an error: spawn failures and timeouts are reported in the
    /// outcome. A missing program fails after one attempt since retrying cannot
    /// help.
    pub async fn execute(&self, task: &Task) -> TaskOutcome {
        let max_attempts = task.max_attempts();
        let mut last_output = String::new();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            clog_debug!(
                "Task {} attempt {}/{}: {}",
                task.id,
                attempt,
                max_attempts,
                task.command_line()
            );

            match run_command(
                &task.command,
                &task.args,
                task.timeout,
                self.working_dir.as_deref(),
            )
            .await
            {
                Ok(output) if output.succeeded() => {
                    return TaskOutcome {
                        success: true,
                        attempts: attempt,
                        output: output.stdout,
                        error: None,
                    };
                }
                Ok(output) => {
                    last_error = Some(output.failure_message());
                    last_output = output.stdout;
                }
                Err(Error::CommandNotFound(cmd)) => {
                    clog_warn!("Task {}: command not found: {}", task.id, cmd);
                    return TaskOutcome {
                        success: false,
                        attempts: attempt,
                        output: String::new(),
                        error: Some(format!("Command not found: {}", cmd)),
                    };
                }
                Err(Error::Timeout(limit)) => {
                    last_error = Some(format!("Timed out after {:?}", limit));
                    last_output.clear();
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    last_output.clear();
                }
            }

            clog_warn!(
                "Task {} attempt {}/{} failed: {}",
                task.id,
                attempt,
                max_attempts,
                last_error.as_deref().unwrap_or("unknown error")
            );

            if attempt < max_attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        TaskOutcome {
            success: false,
            attempts: max_attempts,
            output: last_output,
            error: last_error,
        }
    }
}
