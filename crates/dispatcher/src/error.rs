use std::path::PathBuf;

use psass_core::error::CoreError;
use psass_core::types::WorkerId;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to list input directory {}: {source}", dir.display())]
    ListInput {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn worker {thread_id} ({program}): {source}")]
    Spawn {
        thread_id: WorkerId,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker binary not found: {0}")]
    WorkerBinary(String),

    /// Every worker channel closed while some were still counted as pending.
    #[error("Worker channels closed with {pending} worker(s) still pending")]
    Incomplete { pending: usize },
}
