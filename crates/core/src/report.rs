//! Operator-facing progress reporting.
//!
//! The dispatcher and workers receive a [`Reporter`] at construction
//! instead of reaching for a process-wide logger. Progress lines are
//! gated by [`Verbosity`]; warnings and errors are always surfaced.

use std::sync::Mutex;

use crate::options::Verbosity;

/// Sink for human-readable run progress.
pub trait Reporter: Send + Sync {
    /// Report a progress line that is shown at `level` or above.
    fn progress(&self, level: Verbosity, message: &str);

    fn warning(&self, message: &str);

    fn error(&self, message: &str);
}

// ---------------------------------------------------------------------------
// TracingReporter
// ---------------------------------------------------------------------------

/// Emits report lines as `tracing` events under the `psass` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter {
    verbosity: Verbosity,
}

impl TracingReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }
}

impl Reporter for TracingReporter {
    fn progress(&self, level: Verbosity, message: &str) {
        if self.enabled(level) {
            tracing::info!(target: "psass", "{message}");
        }
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "psass", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "psass", "{message}");
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// One captured report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEntry {
    Progress(Verbosity, String),
    Warning(String),
    Error(String),
}

/// Keeps every report line in memory, regardless of verbosity.
///
/// Used by tests and by embedders that render progress themselves.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    entries: Mutex<Vec<ReportEntry>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ReportEntry> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                ReportEntry::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                ReportEntry::Warning(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReportEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for RecordingReporter {
    fn progress(&self, level: Verbosity, message: &str) {
        self.lock()
            .push(ReportEntry::Progress(level, message.to_string()));
    }

    fn warning(&self, message: &str) {
        self.lock().push(ReportEntry::Warning(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lock().push(ReportEntry::Error(message.to_string()));
    }
}
