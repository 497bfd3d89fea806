// src/state/mod.rs

//! Persistent daemon state.
//!
//! - `store.rs`: crash-safe JSON document store.
//! - `status.rs`: the workflow/healing status document and its in-memory
//!   owner, plus the health snapshot document.

pub mod status;
pub mod store;

pub use status::{HealthSnapshot, RuleCounters, StatusBook, StatusDocument, WorkflowRecord};
pub use store::StateStore;
