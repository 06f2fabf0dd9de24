//! `psass-dispatcher` library crate.
//!
//! Splits a batch of stylesheets into chunks, starts one worker per
//! chunk and tracks their lifecycle messages until every worker is
//! accounted for. The `psass` binary in `main.rs` is a thin CLI over
//! [`Dispatcher`].

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod launcher;

pub use coordinator::{Coordinator, Flow, RunReport, RunState};
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use launcher::{ProcessLauncher, TaskLauncher, WorkerExit, WorkerLauncher};
