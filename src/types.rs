// src/types.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Boxed future returned by the trait seams (process runner, notification
/// sinks, probes, remediation actions) so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle status of a workflow as persisted in the status document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Definition loaded, never run (or never run since the state was reset).
    #[default]
    Registered,
    Running,
    Success,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Registered => "registered",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Success => "success",
            WorkflowStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Severity attached to every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
    Critical,
}

impl Severity {
    /// Prefix used when rendering a message for chat-style webhooks.
    pub fn emoji(self) -> &'static str {
        match self {
            Severity::Info => "📢",
            Severity::Success => "✅",
            Severity::Error => "❌",
            Severity::Critical => "🚨",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// How the delay before an automatic retry grows with consecutive failures.
///
/// - `Fixed`: always wait `retry_delay` (default behaviour, 60s).
/// - `Exponential`: wait `retry_delay * 2^(failures - 1)`, capped by
///   `max_retry_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!(
                "invalid backoff: {other} (expected \"fixed\" or \"exponential\")"
            )),
        }
    }
}

/// When a healing rule's cooldown starts.
///
/// - `AnyAttempt`: every completed remediation attempt (success or failure)
///   stamps the rule and counts against the daily cap (default).
/// - `SuccessOnly`: only successful remediations stamp the rule; a failed
///   attempt leaves the rule immediately eligible for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    #[default]
    AnyAttempt,
    SuccessOnly,
}

impl FromStr for CooldownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any_attempt" => Ok(CooldownPolicy::AnyAttempt),
            "success_only" => Ok(CooldownPolicy::SuccessOnly),
            other => Err(format!(
                "invalid cooldown_policy: {other} (expected \"any_attempt\" or \"success_only\")"
            )),
        }
    }
}
