//! External command execution.
//!
//! The worker only needs "run this to completion and show me stdout line by
//! line", so that contract is a trait. `ProcessRunner` is the real thing;
//! tests substitute their own runners.

use async_trait::async_trait;
use mirror_core::{JobError, SyncCommand};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs a sync command to completion, streaming its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, calling `on_line` for every line of standard output.
    ///
    /// Returns once the process has exited. A nonzero exit is
    /// `JobError::SyncCommand`; failing to start is `JobError::Spawn`.
    async fn run(
        &self,
        command: &SyncCommand,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<(), JobError>;
}

/// Runs commands as child processes via `tokio::process`.
///
/// There is no timeout: a command that never exits holds its job's worker
/// until it does.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &SyncCommand,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<(), JobError> {
        let spawn_error = |source| JobError::Spawn {
            program: command.program().to_string(),
            source,
        };

        debug!("Running: {}", command);
        let mut child = Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(stdout) = child.stdout.take() {
            // rsync redraws its progress line with '\r', so split on both
            let mut segments = BufReader::new(stdout).split(b'\r');
            loop {
                match segments.next_segment().await {
                    Ok(Some(segment)) => {
                        for line in String::from_utf8_lossy(&segment).lines() {
                            if !line.trim().is_empty() {
                                on_line(line);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read output of {}: {}", command.program(), e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await.map_err(spawn_error)?;
        if status.success() {
            Ok(())
        } else {
            Err(JobError::SyncCommand {
                command: command.to_string(),
                status: status.to_string(),
            })
        }
    }
}
