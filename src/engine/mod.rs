// src/engine/mod.rs

//! Orchestration for jobwarden.
//!
//! - [`scheduler`]: one cron timer loop per schedulable workflow, each tick
//!   handing a run to the executor without waiting for it.
//! - [`daemon`]: builds the shared state once, runs the scheduler, health
//!   monitor and healing engine side by side, and performs the ordered
//!   shutdown (stop ticks, terminate processes, flush state).

pub mod daemon;
pub mod scheduler;

pub use daemon::{Daemon, shutdown_signal};
pub use scheduler::Scheduler;
