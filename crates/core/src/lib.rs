//! Shared domain logic for parallel stylesheet compilation.
//!
//! Everything here is pure or engine-facing: run options, chunking,
//! path resolution, the dispatcher/worker wire protocol and the
//! transformation engine seam. Process management lives in the
//! `psass-worker` and `psass-dispatcher` crates.

pub mod chunker;
pub mod engine;
pub mod error;
pub mod logging;
pub mod options;
pub mod protocol;
pub mod report;
pub mod source;
pub mod types;
