//! Starting workers.
//!
//! A [`WorkerLauncher`] turns a thread id into a [`WorkerChannel`]: a
//! byte stream of lifecycle messages, a writer for the handoff line and
//! a future that resolves once the worker is gone. The dispatcher never
//! cares whether the other end is an OS process or an in-process task.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use psass_core::types::WorkerId;

use crate::error::DispatchError;

pub mod process;
pub mod task;

pub use process::ProcessLauncher;
pub use task::TaskLauncher;

pub type MessageReader = Box<dyn AsyncRead + Send + Unpin>;
pub type HandoffWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How a worker went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker exited on its own. `None` when killed by a signal.
    Exited { code: Option<i32> },
    /// The worker outlived its deadline and was killed.
    TimedOut,
    /// Waiting on the worker failed.
    Failed(String),
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Exited { code: Some(code) } => write!(f, "exited with status {code}"),
            WorkerExit::Exited { code: None } => write!(f, "was terminated by a signal"),
            WorkerExit::TimedOut => write!(f, "timed out"),
            WorkerExit::Failed(reason) => write!(f, "could not be awaited ({reason})"),
        }
    }
}

/// Connection to one running worker.
pub struct WorkerChannel {
    /// Newline-delimited lifecycle messages from the worker.
    pub messages: MessageReader,
    /// Receives exactly one handoff line, then is shut down.
    pub handoff: HandoffWriter,
    /// Resolves when the worker has terminated.
    pub exit: BoxFuture<'static, WorkerExit>,
}

/// Starts one worker per call.
pub trait WorkerLauncher: Send + Sync {
    fn launch(
        &self,
        thread_id: WorkerId,
    ) -> impl Future<Output = Result<WorkerChannel, DispatchError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_descriptions() {
        assert_eq!(WorkerExit::Exited { code: Some(2) }.to_string(), "exited with status 2");
        assert_eq!(WorkerExit::Exited { code: None }.to_string(), "was terminated by a signal");
        assert_eq!(WorkerExit::TimedOut.to_string(), "timed out");
    }
}
