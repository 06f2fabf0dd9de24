//! Sequential compile loop for one chunk.
//!
//! For each source file in chunk order the worker:
//!
//! 1. resolves its input and output paths,
//! 2. sends `rendering`,
//! 3. runs the engine and waits for it to resolve,
//! 4. on success writes the stylesheet (and map) and sends `complete`;
//!    on failure writes nothing and sends an error-bearing message.
//!
//! After the last file it sends `finished`. Non-source files are
//! filtered out up front and never produce messages. A chunk with no
//! source files sends `finished` straight away.

use std::path::Path;
use std::sync::Arc;

use psass_core::engine::{RenderOutput, RenderRequest, TransformEngine, TransformError};
use psass_core::options::{RunOptions, Verbosity};
use psass_core::protocol::{LifecycleMessage, WorkerCommand};
use psass_core::report::Reporter;
use psass_core::source::{is_source_file, resolve_paths, ResolvedPaths};
use psass_core::types::WorkerId;

use crate::error::WorkerError;
use crate::sink::MessageSink;

/// Per-worker tally, returned once the chunk is done.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rendered: usize,
    pub failed: usize,
    /// Files dropped by the source-extension filter.
    pub skipped: usize,
}

enum FileOutcome {
    Rendered,
    Failed,
}

/// Compiles one chunk of files, one at a time.
pub struct Worker {
    thread_id: WorkerId,
    options: RunOptions,
    reporter: Arc<dyn Reporter>,
}

impl Worker {
    pub fn new(thread_id: WorkerId, options: RunOptions, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            thread_id,
            options,
            reporter,
        }
    }

    /// Build a worker from its handoff, returning the files it owns.
    pub fn from_command(command: WorkerCommand, reporter: Arc<dyn Reporter>) -> (Self, Vec<String>) {
        let WorkerCommand::Run {
            thread_id,
            options,
            files,
        } = command;
        (Self::new(thread_id, options, reporter), files)
    }

    pub fn thread_id(&self) -> WorkerId {
        self.thread_id
    }

    /// Process every source file in `files`, reporting through `sink`.
    ///
    /// Per-file failures are reported and skipped over; only a broken
    /// message channel aborts the loop.
    pub async fn run<E, S>(
        &self,
        engine: &E,
        files: &[String],
        sink: &mut S,
    ) -> Result<WorkerSummary, WorkerError>
    where
        E: TransformEngine,
        S: MessageSink,
    {
        let (sources, skipped): (Vec<&String>, Vec<&String>) =
            files.iter().partition(|file| is_source_file(file.as_str()));

        let mut summary = WorkerSummary {
            skipped: skipped.len(),
            ..WorkerSummary::default()
        };

        for file in &skipped {
            self.reporter.progress(
                Verbosity::Detail,
                &format!("[{}] Skipping non-source file {file}", self.thread_id),
            );
        }

        let mut remaining = sources.len();
        tracing::debug!(
            thread_id = self.thread_id,
            remaining,
            skipped = summary.skipped,
            "Worker started",
        );

        if remaining == 0 {
            sink.send(&LifecycleMessage::finished(self.thread_id)).await?;
            return Ok(summary);
        }

        for file in sources {
            match self.process_file(engine, file, sink).await? {
                FileOutcome::Rendered => summary.rendered += 1,
                FileOutcome::Failed => summary.failed += 1,
            }

            remaining -= 1;
            if remaining == 0 {
                sink.send(&LifecycleMessage::finished(self.thread_id)).await?;
            }
        }

        tracing::debug!(
            thread_id = self.thread_id,
            rendered = summary.rendered,
            failed = summary.failed,
            "Worker finished",
        );

        Ok(summary)
    }

    async fn process_file<E, S>(
        &self,
        engine: &E,
        file: &str,
        sink: &mut S,
    ) -> Result<FileOutcome, WorkerError>
    where
        E: TransformEngine,
        S: MessageSink,
    {
        let paths = resolve_paths(file, &self.options);

        sink.send(&LifecycleMessage::rendering(
            self.thread_id,
            paths.in_file.clone(),
            paths.out_file.clone(),
        ))
        .await?;

        let request = RenderRequest::new(&paths, &self.options);
        let result = match engine.render(&request).await {
            Ok(output) => write_artifacts(&paths, &output).await.map(|()| output.stats),
            Err(err) => Err(err),
        };

        match result {
            Ok(stats) => {
                sink.send(&LifecycleMessage::complete(
                    self.thread_id,
                    paths.in_file,
                    paths.out_file,
                    stats,
                ))
                .await?;
                Ok(FileOutcome::Rendered)
            }
            Err(err) => {
                self.reporter.progress(
                    Verbosity::Debug,
                    &format!("[{}] Failed {}: {err}", self.thread_id, paths.in_file.display()),
                );
                sink.send(&LifecycleMessage::failed(
                    self.thread_id,
                    paths.in_file,
                    paths.out_file,
                    err,
                ))
                .await?;
                Ok(FileOutcome::Failed)
            }
        }
    }
}

/// Write the stylesheet and, when both requested and produced, its map.
///
/// If the map cannot be written the stylesheet is removed again so a
/// failed file leaves no artifact behind.
async fn write_artifacts(paths: &ResolvedPaths, output: &RenderOutput) -> Result<(), TransformError> {
    if let Some(parent) = paths.out_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_error(parent, e))?;
    }

    tokio::fs::write(&paths.out_file, &output.css)
        .await
        .map_err(|e| write_error(&paths.out_file, e))?;

    if let (Some(map_file), Some(map)) = (&paths.map_file, &output.map) {
        if let Err(e) = tokio::fs::write(map_file, map).await {
            let _ = tokio::fs::remove_file(&paths.out_file).await;
            return Err(write_error(map_file, e));
        }
    }

    Ok(())
}

fn write_error(path: &Path, err: std::io::Error) -> TransformError {
    TransformError::new(format!("failed to write output: {err}")).with_file(path)
}

#[cfg(test)]
mod tests {
    use psass_core::protocol::{decode_line, Action};
    use psass_core::report::RecordingReporter;

    use super::*;
    use crate::sink::LineSink;

    /// Compiles everything except files whose name contains `broken`.
    struct FakeEngine;

    impl TransformEngine for FakeEngine {
        async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, TransformError> {
            let name = request.file.file_name().unwrap_or_default().to_string_lossy();
            if name.contains("broken") {
                return Err(TransformError::new("Invalid CSS").with_file(&request.file));
            }
            Ok(RenderOutput {
                css: format!("/* {} */", request.file.display()).into_bytes(),
                map: request.source_map.as_ref().map(|_| b"{\"version\":3}".to_vec()),
                stats: None,
            })
        }
    }

    fn options(dir: &Path, source_map: bool) -> RunOptions {
        let mut opts = RunOptions::new(dir.join("in"), dir.join("out"));
        opts.source_map = source_map;
        opts
    }

    async fn run_chunk(opts: RunOptions, files: &[&str]) -> (WorkerSummary, Vec<LifecycleMessage>) {
        let worker = Worker::new(4, opts, Arc::new(RecordingReporter::new()));
        let files: Vec<String> = files.iter().map(|f| f.to_string()).collect();
        let mut sink = LineSink::new(Vec::new());
        let summary = worker.run(&FakeEngine, &files, &mut sink).await.unwrap();
        let written = String::from_utf8(sink.into_inner()).unwrap();
        let messages = written.lines().map(|l| decode_line(l).unwrap()).collect();
        (summary, messages)
    }

    fn shape(messages: &[LifecycleMessage]) -> Vec<&'static str> {
        messages
            .iter()
            .map(|m| match (m.action, &m.error) {
                (_, Some(_)) => "error",
                (Some(Action::Rendering), None) => "rendering",
                (Some(Action::Complete), None) => "complete",
                (Some(Action::Finished), None) => "finished",
                (None, None) => "empty",
            })
            .collect()
    }

    #[tokio::test]
    async fn messages_follow_file_order_and_end_with_finished() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, messages) =
            run_chunk(options(dir.path(), false), &["a.scss", "broken.scss", "c.scss"]).await;

        assert_eq!(
            shape(&messages),
            vec!["rendering", "complete", "rendering", "error", "rendering", "complete", "finished"]
        );
        assert_eq!(summary, WorkerSummary { rendered: 2, failed: 1, skipped: 0 });
        assert!(messages.iter().all(|m| m.thread_id == Some(4)));
        assert_eq!(messages[2].in_file, Some(dir.path().join("in/broken.scss")));
    }

    #[tokio::test]
    async fn failed_file_leaves_no_output_and_next_file_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let (_, messages) = run_chunk(options(dir.path(), true), &["broken.scss", "ok.scss"]).await;

        assert_eq!(shape(&messages), vec!["rendering", "error", "rendering", "complete", "finished"]);
        assert!(!dir.path().join("out/broken.css").exists());
        assert!(!dir.path().join("out/broken.css.map").exists());
        assert!(dir.path().join("out/ok.css").exists());
        assert!(dir.path().join("out/ok.css.map").exists());
    }

    #[tokio::test]
    async fn non_source_files_are_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, messages) =
            run_chunk(options(dir.path(), false), &["notes.txt", "a.scss", "b.sass"]).await;

        assert_eq!(shape(&messages), vec!["rendering", "complete", "finished"]);
        assert_eq!(summary.skipped, 2);
    }

    #[tokio::test]
    async fn chunk_without_sources_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let (summary, messages) = run_chunk(options(dir.path(), false), &["README.md"]).await;
        assert_eq!(shape(&messages), vec!["finished"]);
        assert_eq!(summary.rendered, 0);

        let (_, messages) = run_chunk(options(dir.path(), false), &[]).await;
        assert_eq!(shape(&messages), vec!["finished"]);
    }

    #[tokio::test]
    async fn output_lands_in_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        run_chunk(options(dir.path(), false), &["pages/home.scss"]).await;

        let written = std::fs::read_to_string(dir.path().join("out/pages/home.css")).unwrap();
        assert!(written.contains("home.scss"));
    }

    #[tokio::test]
    async fn complete_message_names_resolved_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (_, messages) = run_chunk(options(dir.path(), false), &["/elsewhere/a.scss"]).await;

        let complete = &messages[1];
        assert_eq!(complete.in_file, Some(dir.path().join("in/a.scss")));
        assert_eq!(complete.out_file, Some(dir.path().join("out/a.css")));
    }

    #[test]
    fn from_command_unpacks_handoff() {
        let cmd = WorkerCommand::Run {
            thread_id: 9,
            options: RunOptions::new("in", "out"),
            files: vec!["x.scss".into()],
        };
        let (worker, files) = Worker::from_command(cmd, Arc::new(RecordingReporter::new()));
        assert_eq!(worker.thread_id(), 9);
        assert_eq!(files, vec!["x.scss".to_string()]);
    }
}
