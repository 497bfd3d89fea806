// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Variants follow the failure classes the daemon distinguishes:
//! configuration problems skip the offending item, execution and remediation
//! failures become state + notifications, persistence failures are logged
//! while in-memory state stays authoritative.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobwardenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid schedule for workflow '{workflow}': {reason}")]
    InvalidSchedule { workflow: String, reason: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Healing rule not found: {0}")]
    RuleNotFound(String),

    #[error("Unknown remediation action '{action}' referenced by rule '{rule}'")]
    UnknownAction { rule: String, action: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Remediation failed: {0}")]
    RemediationFailed(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobwardenError>;
