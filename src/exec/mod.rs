// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`runner`]: the `ProcessRunner` seam and the tokio-based real runner.
//! - [`running`]: the at-most-one-run-per-workflow gate.
//! - [`executor`]: one workflow run end to end (state, retries,
//!   notifications).

pub mod executor;
pub mod runner;
pub mod running;

pub use executor::{Executor, ExecutorOptions, RunOutcome, TriggerReason};
pub use runner::{CommandSpec, ExitKind, ProcessOutput, ProcessRunner, RealProcessRunner};
pub use running::{RunGuard, RunningSet};
