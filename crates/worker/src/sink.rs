//! Outbound lifecycle message channel.
//!
//! A worker only ever talks to the dispatcher through a [`MessageSink`].
//! In a worker process that sink is a [`LineSink`] over stdout; tests and
//! the in-process launcher plug in any other async writer.

use std::future::Future;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use psass_core::protocol::{encode_line, LifecycleMessage};

use crate::error::WorkerError;

/// Destination for a worker's lifecycle messages.
pub trait MessageSink: Send {
    fn send(
        &mut self,
        message: &LifecycleMessage,
    ) -> impl Future<Output = Result<(), WorkerError>> + Send;
}

/// Writes each message as one JSON line and flushes immediately, so the
/// dispatcher sees progress as it happens.
pub struct LineSink<W> {
    writer: W,
}

impl<W> LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> MessageSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &LifecycleMessage) -> Result<(), WorkerError> {
        let line = encode_line(message)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
