use psass_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The dispatcher side of the message channel is gone.
    #[error("Failed to send lifecycle message: {0}")]
    Channel(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}
