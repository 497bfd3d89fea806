// src/workflow/mod.rs

//! Workflow catalog: resolved definitions, the registry holding them and
//! cron schedule handling.

pub mod definition;
pub mod registry;
pub mod schedule;

pub use definition::{RetryPolicy, WorkflowDefinition};
pub use registry::WorkflowRegistry;
pub use schedule::CronSchedule;
