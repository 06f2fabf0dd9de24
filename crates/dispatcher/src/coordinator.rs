//! Run-completion bookkeeping.
//!
//! [`Coordinator`] is the single writer of the pending-worker count. It
//! consumes lifecycle messages and worker exits in whatever order they
//! arrive and signals [`Flow::Complete`] exactly once, on the event that
//! takes the count to zero. It performs no I/O beyond reporting, so the
//! whole state machine is testable without spawning anything.
//!
//! ```text
//! Idle -> Spawning -> AwaitingCompletion -> Done
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use psass_core::options::Verbosity;
use psass_core::protocol::{Action, LifecycleMessage};
use psass_core::report::Reporter;
use psass_core::types::WorkerId;

use crate::launcher::WorkerExit;

/// Lifecycle of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Spawning,
    AwaitingCompletion,
    Done,
}

/// What the event loop should do after handing an event to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The run has just completed. Returned once per run.
    Complete,
}

/// Dispatcher-side record of a live worker.
///
/// Dropped as soon as the worker reports `finished` or its process exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub thread_id: WorkerId,
    /// Files in the chunk handed to this worker.
    pub files: usize,
    pub spawned_at: DateTime<Utc>,
}

/// Outcome of a batch run, handed back to the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workers_spawned: usize,
    pub files_rendered: usize,
    pub files_failed: usize,
    /// Workers that exited (or were killed) without sending `finished`.
    pub lost_workers: Vec<WorkerId>,
    /// Lines from workers that could not be decoded.
    pub protocol_errors: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workers_spawned: 0,
            files_rendered: 0,
            files_failed: 0,
            lost_workers: Vec::new(),
            protocol_errors: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Process exit status for this run.
    ///
    /// Lost workers always fail the run. Per-file errors only do so when
    /// `fail_on_error` is set.
    pub fn exit_code(&self, fail_on_error: bool) -> u8 {
        if !self.lost_workers.is_empty() || (fail_on_error && self.files_failed > 0) {
            1
        } else {
            0
        }
    }
}

/// Owns PendingCount and the worker handles for one run.
pub struct Coordinator {
    state: RunState,
    pending: usize,
    workers: HashMap<WorkerId, WorkerHandle>,
    report: RunReport,
    reporter: Arc<dyn Reporter>,
}

impl Coordinator {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            state: RunState::Idle,
            pending: 0,
            workers: HashMap::new(),
            report: RunReport::new(),
            reporter,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    pub fn begin_spawning(&mut self) {
        if self.state == RunState::Idle {
            self.state = RunState::Spawning;
        }
    }

    /// Record a freshly spawned worker and count it as pending.
    pub fn register(&mut self, thread_id: WorkerId, files: usize) {
        if self.state != RunState::Spawning {
            tracing::warn!(thread_id, state = ?self.state, "Worker registered outside of spawning");
            return;
        }

        let handle = WorkerHandle {
            thread_id,
            files,
            spawned_at: Utc::now(),
        };
        if self.workers.insert(thread_id, handle).is_none() {
            self.pending += 1;
            self.report.workers_spawned += 1;
        }
    }

    /// All chunks have been handed out. Completes immediately when
    /// nothing was spawned.
    pub fn spawning_complete(&mut self) -> Flow {
        if self.state != RunState::Spawning {
            return Flow::Continue;
        }

        self.state = RunState::AwaitingCompletion;
        tracing::debug!(pending = self.pending, "All workers dispatched");

        if self.pending == 0 {
            self.finish()
        } else {
            Flow::Continue
        }
    }

    /// Apply one lifecycle message, from any worker.
    pub fn on_message(&mut self, message: &LifecycleMessage) -> Flow {
        if self.state == RunState::Done {
            return Flow::Continue;
        }

        let tag = message
            .thread_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());

        if let Some(error) = &message.error {
            self.report.files_failed += 1;
            self.reporter.error(&format!("[{tag}] {error}"));
        }

        match message.action {
            Some(Action::Rendering) => {
                self.reporter.progress(
                    Verbosity::Basic,
                    &format!(
                        "[{tag}] Rendering file: {} to {}",
                        display_path(message.in_file.as_deref()),
                        display_path(message.out_file.as_deref()),
                    ),
                );
                Flow::Continue
            }
            Some(Action::Complete) => {
                self.report.files_rendered += 1;
                self.reporter.progress(
                    Verbosity::Basic,
                    &format!(
                        "[{tag}] Completed {} to {}",
                        display_path(message.in_file.as_deref()),
                        display_path(message.out_file.as_deref()),
                    ),
                );
                Flow::Continue
            }
            Some(Action::Finished) => {
                self.reporter
                    .progress(Verbosity::Basic, &format!("[{tag}] Finished."));
                match message.thread_id.and_then(|id| self.workers.remove(&id)) {
                    Some(handle) => {
                        tracing::debug!(
                            thread_id = handle.thread_id,
                            files = handle.files,
                            elapsed_ms = (Utc::now() - handle.spawned_at).num_milliseconds(),
                            "Worker finished",
                        );
                        self.retire()
                    }
                    None => {
                        self.reporter.warning(&format!(
                            "[{tag}] Ignoring finished from an unknown or already finished worker"
                        ));
                        Flow::Continue
                    }
                }
            }
            None => Flow::Continue,
        }
    }

    /// A worker's process (or message stream) has ended.
    ///
    /// Exits after `finished` are routine. A worker that ends without
    /// having finished is lost: it is reported and stops counting
    /// towards PendingCount so the run cannot hang on it.
    pub fn on_exit(&mut self, thread_id: WorkerId, exit: &WorkerExit) -> Flow {
        if self.state == RunState::Done {
            return Flow::Continue;
        }

        let Some(handle) = self.workers.remove(&thread_id) else {
            tracing::debug!(thread_id, %exit, "Worker exited");
            return Flow::Continue;
        };

        self.report.lost_workers.push(thread_id);
        self.reporter.error(&format!(
            "[{thread_id}] Worker {exit} without finishing its chunk of {} file(s)",
            handle.files
        ));
        self.retire()
    }

    /// A line from `thread_id` could not be decoded.
    pub fn on_protocol_error(&mut self, thread_id: WorkerId, error: &str) {
        self.report.protocol_errors += 1;
        self.reporter
            .warning(&format!("[{thread_id}] Unreadable worker message: {error}"));
    }

    fn retire(&mut self) -> Flow {
        self.pending = self.pending.saturating_sub(1);

        if self.pending == 0 && self.state == RunState::AwaitingCompletion {
            self.finish()
        } else {
            Flow::Continue
        }
    }

    fn finish(&mut self) -> Flow {
        self.state = RunState::Done;
        self.report.finished_at = Some(Utc::now());
        tracing::debug!(run_id = %self.report.run_id, "Run complete");
        Flow::Complete
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}
