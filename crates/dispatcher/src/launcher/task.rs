//! Workers as tokio tasks inside the dispatcher process.
//!
//! Speaks exactly the same line protocol as a worker process, over
//! in-memory duplex pipes. Used for embedding and for exercising the
//! dispatcher without building or spawning the worker binary.

use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream};
use tokio_util::task::AbortOnDropHandle;

use psass_core::engine::TransformEngine;
use psass_core::protocol::{decode_line, WorkerCommand};
use psass_core::report::Reporter;
use psass_core::types::WorkerId;
use psass_worker::{LineSink, Worker, WorkerError};

use super::{WorkerChannel, WorkerExit, WorkerLauncher};
use crate::error::DispatchError;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Runs each worker as a spawned task sharing one engine.
pub struct TaskLauncher<E> {
    engine: E,
    reporter: Arc<dyn Reporter>,
}

impl<E> TaskLauncher<E>
where
    E: TransformEngine + Clone + 'static,
{
    pub fn new(engine: E, reporter: Arc<dyn Reporter>) -> Self {
        Self { engine, reporter }
    }
}

impl<E> WorkerLauncher for TaskLauncher<E>
where
    E: TransformEngine + Clone + 'static,
{
    async fn launch(&self, thread_id: WorkerId) -> Result<WorkerChannel, DispatchError> {
        let (handoff, handoff_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let (messages_tx, messages) = tokio::io::duplex(PIPE_CAPACITY);

        let engine = self.engine.clone();
        let reporter = self.reporter.clone();
        // Dropping the exit future aborts the worker, like killing a process.
        let task = AbortOnDropHandle::new(tokio::spawn(serve(engine, reporter, handoff_rx, messages_tx)));

        let exit = async move {
            match task.await {
                Ok(Ok(())) => WorkerExit::Exited { code: Some(0) },
                Ok(Err(e)) => {
                    tracing::error!(thread_id, error = %e, "Worker task failed");
                    WorkerExit::Exited { code: Some(1) }
                }
                Err(e) => WorkerExit::Failed(e.to_string()),
            }
        }
        .boxed();

        tracing::debug!(thread_id, "Worker task spawned");

        Ok(WorkerChannel {
            messages: Box::new(messages),
            handoff: Box::new(handoff),
            exit,
        })
    }
}

/// Worker side of one task: read the handoff, run the chunk, hang up.
async fn serve<E>(
    engine: E,
    reporter: Arc<dyn Reporter>,
    handoff: DuplexStream,
    messages: DuplexStream,
) -> Result<(), WorkerError>
where
    E: TransformEngine,
{
    let mut lines = BufReader::new(handoff).lines();
    let Some(line) = lines.next_line().await? else {
        tracing::debug!("Handoff channel closed before a command arrived");
        return Ok(());
    };

    let command: WorkerCommand = decode_line(&line)?;
    let (worker, files) = Worker::from_command(command, reporter);

    let mut sink = LineSink::new(messages);
    worker.run(&engine, &files, &mut sink).await?;
    Ok(())
}
