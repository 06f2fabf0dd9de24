//! `psass-worker` -- compiles one chunk of stylesheets.
//!
//! Spawned by the `psass` dispatcher, never run by hand. Reads a single
//! `run` handoff line from stdin, compiles the listed files in order and
//! writes lifecycle messages to stdout as JSON lines. Diagnostics go to
//! stderr, which the dispatcher leaves attached to the operator's
//! terminal.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use psass_core::engine::CommandEngine;
use psass_core::logging;
use psass_core::protocol::{decode_line, WorkerCommand};
use psass_core::report::TracingReporter;
use psass_worker::{LineSink, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let line = stdin
        .next_line()
        .await
        .context("failed to read handoff from stdin")?
        .context("stdin closed before a handoff arrived")?;

    let command: WorkerCommand = decode_line(&line).context("malformed handoff")?;
    let WorkerCommand::Run { options, .. } = &command;
    let verbosity = options.verbose;
    let engine = CommandEngine::from_options(options);

    logging::init(verbosity, std::io::stderr);

    let reporter = Arc::new(TracingReporter::new(verbosity));
    let (worker, files) = Worker::from_command(command, reporter);

    tracing::debug!(
        thread_id = worker.thread_id(),
        files = files.len(),
        compiler = engine.program(),
        "Handoff received",
    );

    let mut sink = LineSink::new(tokio::io::stdout());
    let summary = worker.run(&engine, &files, &mut sink).await?;

    tracing::debug!(
        thread_id = worker.thread_id(),
        rendered = summary.rendered,
        failed = summary.failed,
        skipped = summary.skipped,
        "Worker exiting",
    );

    Ok(())
}
