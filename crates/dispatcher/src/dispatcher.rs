//! Batch run orchestration.
//!
//! [`Dispatcher::run`] splits the file list into chunks, starts one
//! worker per non-empty chunk and funnels every worker's output into a
//! single event channel. One loop drains that channel into the
//! [`Coordinator`], so PendingCount has exactly one writer no matter how
//! many workers report concurrently.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::task::AbortOnDropHandle;

use psass_core::chunker;
use psass_core::options::{RunOptions, Verbosity};
use psass_core::protocol::{decode_line, encode_line, LifecycleMessage, WorkerCommand, MAX_LINE_BYTES};
use psass_core::report::Reporter;
use psass_core::types::WorkerId;

use crate::coordinator::{Coordinator, Flow, RunReport};
use crate::error::DispatchError;
use crate::launcher::{HandoffWriter, MessageReader, WorkerChannel, WorkerExit, WorkerLauncher};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a worker can tell the dispatcher.
#[derive(Debug)]
enum WorkerEvent {
    Message(LifecycleMessage),
    Malformed { thread_id: WorkerId, error: String },
    Exited { thread_id: WorkerId, exit: WorkerExit },
}

pub struct Dispatcher<L> {
    options: RunOptions,
    launcher: L,
    reporter: Arc<dyn Reporter>,
}

impl<L> Dispatcher<L>
where
    L: WorkerLauncher,
{
    pub fn new(options: RunOptions, launcher: L, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            options,
            launcher,
            reporter,
        }
    }

    /// Compile `files`, or every entry of the input directory when `None`.
    ///
    /// Resolves once every spawned worker has either sent `finished` or
    /// gone away. Per-file failures are reported and tallied in the
    /// returned [`RunReport`]; only setup failures are errors.
    pub async fn run(&self, files: Option<Vec<String>>) -> Result<RunReport, DispatchError> {
        self.options.validate()?;

        let files = match files {
            Some(files) => files,
            None => list_input_files(&self.options.input_dir).await?,
        };

        let chunks = chunker::split(&files, self.options.threads);
        self.reporter.progress(
            Verbosity::Detail,
            &format!(
                "Dispatching {} file(s) across up to {} worker(s)",
                files.len(),
                self.options.threads
            ),
        );

        let mut coordinator = Coordinator::new(self.reporter.clone());
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        // Aborting a forwarder drops its exit handle, which stops the worker.
        let mut forwarders = JoinSet::new();

        coordinator.begin_spawning();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if chunk.is_empty() {
                continue;
            }

            let thread_id = index as WorkerId;
            let WorkerChannel {
                messages,
                handoff,
                exit,
            } = match self.launcher.launch(thread_id).await {
                Ok(channel) => channel,
                Err(e) => {
                    forwarders.shutdown().await;
                    return Err(e);
                }
            };
            coordinator.register(thread_id, chunk.len());

            // Listen before handing off so no early message is missed.
            let exit = AbortOnDropHandle::new(tokio::spawn(exit));
            forwarders.spawn(forward_events(thread_id, messages, exit, tx.clone()));

            self.reporter.progress(
                Verbosity::Detail,
                &format!("[{thread_id}] Handing off {} file(s)", chunk.len()),
            );
            let command = WorkerCommand::Run {
                thread_id,
                options: self.options.clone(),
                files: chunk,
            };
            if let Err(e) = send_handoff(handoff, &command).await {
                // The exit event will mark this worker as lost.
                self.reporter
                    .error(&format!("[{thread_id}] Failed to hand off chunk: {e}"));
            }
        }
        drop(tx);

        if coordinator.spawning_complete() == Flow::Complete {
            forwarders.detach_all();
            return Ok(coordinator.into_report());
        }

        while let Some(event) = rx.recv().await {
            let flow = match event {
                WorkerEvent::Message(message) => coordinator.on_message(&message),
                WorkerEvent::Malformed { thread_id, error } => {
                    coordinator.on_protocol_error(thread_id, &error);
                    Flow::Continue
                }
                WorkerEvent::Exited { thread_id, exit } => coordinator.on_exit(thread_id, &exit),
            };

            if flow == Flow::Complete {
                // Finished workers are left to exit on their own.
                forwarders.detach_all();
                return Ok(coordinator.into_report());
            }
        }

        Err(DispatchError::Incomplete {
            pending: coordinator.pending(),
        })
    }
}

/// Sorted names of the entries in `dir`.
pub async fn list_input_files(dir: &Path) -> Result<Vec<String>, DispatchError> {
    let list_error = |source| DispatchError::ListInput {
        dir: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(list_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
        files.push(entry.file_name().to_string_lossy().into_owned());
    }
    files.sort();

    tracing::debug!(dir = %dir.display(), count = files.len(), "Listed input directory");
    Ok(files)
}

async fn send_handoff(mut writer: HandoffWriter, command: &WorkerCommand) -> Result<(), DispatchError> {
    let line = encode_line(command)?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(psass_core::error::CoreError::from)?;
    writer
        .shutdown()
        .await
        .map_err(psass_core::error::CoreError::from)?;
    Ok(())
}

/// Decode one worker's message stream into events, then report its exit.
///
/// The exit event always comes after the last message, so a `finished`
/// that made it onto the wire is seen before the exit. Every message is
/// attributed to the channel it arrived on, whatever id it claims.
async fn forward_events(
    thread_id: WorkerId,
    messages: MessageReader,
    exit: AbortOnDropHandle<WorkerExit>,
    tx: mpsc::Sender<WorkerEvent>,
) {
    let mut lines = FramedRead::new(messages, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut resume = false;

    loop {
        let line = match lines.next().await {
            Some(line) => line,
            // After a decode error the stream yields `None` once, then resumes.
            None if std::mem::take(&mut resume) => continue,
            None => break,
        };

        let event = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match decode_line::<LifecycleMessage>(&line) {
                Ok(mut message) => {
                    if message.thread_id.is_some_and(|claimed| claimed != thread_id) {
                        tracing::warn!(thread_id, claimed = ?message.thread_id, "Worker sent a foreign thread id");
                    }
                    message.thread_id = Some(thread_id);
                    WorkerEvent::Message(message)
                }
                Err(e) => WorkerEvent::Malformed {
                    thread_id,
                    error: e.to_string(),
                },
            },
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                resume = true;
                WorkerEvent::Malformed {
                    thread_id,
                    error: format!("line exceeds {MAX_LINE_BYTES} bytes"),
                }
            }
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                resume = true;
                WorkerEvent::Malformed {
                    thread_id,
                    error: e.to_string(),
                }
            }
            Err(LinesCodecError::Io(e)) => {
                tracing::warn!(thread_id, error = %e, "Worker message stream failed");
                break;
            }
        };

        if tx.send(event).await.is_err() {
            return;
        }
    }

    let exit = exit
        .await
        .unwrap_or_else(|e| WorkerExit::Failed(e.to_string()));
    let _ = tx.send(WorkerEvent::Exited { thread_id, exit }).await;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn input_listing_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.scss", "a.scss", "b.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let files = list_input_files(dir.path()).await.unwrap();
        assert_eq!(files, vec!["a.scss", "b.txt", "c.scss"]);
    }

    #[tokio::test]
    async fn missing_input_directory_is_an_error() {
        let err = list_input_files(Path::new("/nonexistent/psass-input"))
            .await
            .unwrap_err();
        assert_matches!(err, DispatchError::ListInput { .. });
    }

    async fn forward(thread_id: WorkerId, payload: Vec<u8>) -> Vec<WorkerEvent> {
        let reader: MessageReader = Box::new(std::io::Cursor::new(payload));
        let exit = AbortOnDropHandle::new(tokio::spawn(async { WorkerExit::Exited { code: Some(0) } }));
        let (tx, mut rx) = mpsc::channel(8);

        tokio::spawn(forward_events(thread_id, reader, exit, tx));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn forwarder_decodes_lines_then_reports_exit() {
        let payload = format!(
            "{}not json\n\n{}",
            encode_line(&LifecycleMessage::rendering(0, "a.scss".into(), "a.css".into())).unwrap(),
            encode_line(&LifecycleMessage::finished(0)).unwrap(),
        );
        let events = forward(0, payload.into_bytes()).await;

        assert_eq!(events.len(), 4);
        assert_matches!(&events[0], WorkerEvent::Message(m) if m.thread_id == Some(0));
        assert_matches!(&events[1], WorkerEvent::Malformed { thread_id: 0, .. });
        assert_matches!(&events[2], WorkerEvent::Message(m) if m.is_finished());
        assert_matches!(
            &events[3],
            WorkerEvent::Exited { thread_id: 0, exit: WorkerExit::Exited { code: Some(0) } }
        );
    }

    #[tokio::test]
    async fn oversized_line_is_reported_and_reading_continues() {
        let mut payload = vec![b'x'; MAX_LINE_BYTES + 10];
        payload.push(b'\n');
        payload.extend(encode_line(&LifecycleMessage::finished(0)).unwrap().into_bytes());

        let events = forward(0, payload).await;

        assert_eq!(events.len(), 3);
        assert_matches!(&events[0], WorkerEvent::Malformed { thread_id: 0, error } if error.contains("exceeds"));
        assert_matches!(&events[1], WorkerEvent::Message(m) if m.is_finished());
        assert_matches!(&events[2], WorkerEvent::Exited { thread_id: 0, .. });
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_reported_and_reading_continues() {
        let mut payload = vec![0xff, 0xfe, b'\n'];
        payload.extend(encode_line(&LifecycleMessage::finished(2)).unwrap().into_bytes());

        let events = forward(2, payload).await;

        assert_eq!(events.len(), 3);
        assert_matches!(&events[0], WorkerEvent::Malformed { thread_id: 2, .. });
        assert_matches!(&events[1], WorkerEvent::Message(m) if m.is_finished());
    }

    #[tokio::test]
    async fn messages_are_attributed_to_their_channel() {
        let payload = format!(
            "{}{}",
            r#"{"error":{"message":"boom"}}"#.to_string() + "\n",
            encode_line(&LifecycleMessage::finished(5)).unwrap(),
        );

        let events = forward(1, payload.into_bytes()).await;

        assert_matches!(&events[0], WorkerEvent::Message(m) if m.thread_id == Some(1) && m.error.is_some());
        assert_matches!(&events[1], WorkerEvent::Message(m) if m.thread_id == Some(1) && m.is_finished());
    }
}
