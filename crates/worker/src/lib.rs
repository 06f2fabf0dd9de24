//! `psass-worker` library crate.
//!
//! The per-chunk compile loop and its message sink. The binary
//! entrypoint in `main.rs` wires these to stdin/stdout so that the
//! dispatcher can run each chunk in its own process.

pub mod error;
pub mod sink;
pub mod worker;

pub use error::WorkerError;
pub use sink::{LineSink, MessageSink};
pub use worker::{Worker, WorkerSummary};
