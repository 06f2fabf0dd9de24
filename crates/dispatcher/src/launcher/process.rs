//! Workers as child processes running the `psass-worker` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures::FutureExt;
use tokio::process::{Child, Command};

use psass_core::types::WorkerId;

use super::{WorkerChannel, WorkerExit, WorkerLauncher};
use crate::error::DispatchError;

/// File name of the worker binary, without platform suffix.
pub const WORKER_BIN_NAME: &str = "psass-worker";

/// Spawns one `psass-worker` process per chunk.
///
/// stdin carries the handoff, stdout carries lifecycle messages and
/// stderr is inherited so worker diagnostics reach the terminal.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill any worker still running `timeout` after it was spawned.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use `explicit` if given, else the worker binary installed next to
    /// the running executable.
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self, DispatchError> {
        if let Some(program) = explicit {
            return Ok(Self::new(program));
        }

        let exe = std::env::current_exe().map_err(|e| DispatchError::WorkerBinary(e.to_string()))?;
        let dir = exe.parent().ok_or_else(|| {
            DispatchError::WorkerBinary(format!("{} has no parent directory", exe.display()))
        })?;

        let program = sibling_binary(dir);
        if !program.is_file() {
            return Err(DispatchError::WorkerBinary(format!(
                "{} does not exist; pass --worker-bin",
                program.display()
            )));
        }

        Ok(Self::new(program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn sibling_binary(dir: &Path) -> PathBuf {
    dir.join(format!("{WORKER_BIN_NAME}{}", std::env::consts::EXE_SUFFIX))
}

impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, thread_id: WorkerId) -> Result<WorkerChannel, DispatchError> {
        let spawn_error = |source: std::io::Error| DispatchError::Spawn {
            thread_id,
            program: self.program.display().to_string(),
            source,
        };

        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("stdout was not captured")))?;

        tracing::debug!(thread_id, pid = child.id(), program = %self.program.display(), "Worker spawned");

        Ok(WorkerChannel {
            messages: Box::new(stdout),
            handoff: Box::new(stdin),
            exit: wait_for_exit(thread_id, child, self.timeout).boxed(),
        })
    }
}

async fn wait_for_exit(thread_id: WorkerId, mut child: Child, timeout: Option<Duration>) -> WorkerExit {
    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(thread_id, ?limit, "Worker timed out, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(thread_id, error = %e, "Failed to kill worker");
                }
                return WorkerExit::TimedOut;
            }
        },
        None => child.wait().await,
    };

    match status {
        Ok(status) => WorkerExit::Exited {
            code: status.code(),
        },
        Err(e) => WorkerExit::Failed(e.to_string()),
    }
}
