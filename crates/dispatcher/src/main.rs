//! `psass` -- parallel SCSS batch compiler.
//!
//! Parses the command line, starts `psass-worker` processes through the
//! dispatcher and turns the run report into an exit status.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use psass_core::logging;
use psass_core::options::Verbosity;
use psass_core::report::TracingReporter;
use psass_dispatcher::config::Cli;
use psass_dispatcher::{Dispatcher, ProcessLauncher};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(Verbosity::from_count(cli.verbose), std::io::stdout);

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<u8> {
    let options = cli.run_options();

    let mut launcher = ProcessLauncher::locate(cli.worker_bin.clone())?;
    if let Some(timeout) = cli.worker_timeout() {
        launcher = launcher.with_timeout(timeout);
    }

    tracing::debug!(
        worker = %launcher.program().display(),
        threads = options.threads,
        input = %options.input_dir.display(),
        output = %options.output_dir.display(),
        "Starting run",
    );

    let reporter = Arc::new(TracingReporter::new(options.verbose));
    let dispatcher = Dispatcher::new(options, launcher, reporter);
    let report = dispatcher.run(cli.file_list()).await?;

    let elapsed_ms = report
        .finished_at
        .map(|end| (end - report.started_at).num_milliseconds())
        .unwrap_or_default();

    tracing::info!(
        run_id = %report.run_id,
        workers = report.workers_spawned,
        rendered = report.files_rendered,
        failed = report.files_failed,
        lost = report.lost_workers.len(),
        elapsed_ms,
        "Run complete",
    );

    Ok(report.exit_code(cli.fail_on_error))
}
