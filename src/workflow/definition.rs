// src/workflow/definition.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{DaemonSection, WorkflowConfig};
use crate::exec::CommandSpec;
use crate::types::BackoffStrategy;

/// Delay policy for automatic retries after a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub backoff: BackoffStrategy,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            backoff: BackoffStrategy::Fixed,
            max_delay: delay,
        }
    }

    /// Delay before the retry that follows the `failures`-th consecutive
    /// failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Exponential => {
                let exp = failures.saturating_sub(1).min(31);
                self.delay
                    .checked_mul(1u32 << exp)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }
}

/// Immutable, fully resolved workflow definition.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub schedule: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    /// `[daemon].env` with the workflow's own `env` merged on top.
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub max_retries: u32,
    pub enabled: bool,
    pub retry: RetryPolicy,
}

impl WorkflowDefinition {
    pub fn from_config(id: &str, cfg: &WorkflowConfig, daemon: &DaemonSection) -> Self {
        let mut env = daemon.env.clone();
        env.extend(cfg.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let working_dir = match &cfg.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => daemon.working_dir.join(dir),
            None => daemon.working_dir.clone(),
        };

        Self {
            id: id.to_string(),
            name: cfg.display_name(id).to_string(),
            schedule: cfg
                .schedule
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            env,
            working_dir,
            timeout: cfg.timeout,
            max_retries: cfg.max_retries,
            enabled: cfg.enabled,
            retry: RetryPolicy {
                delay: cfg.retry_delay.unwrap_or(daemon.retry_delay),
                backoff: daemon.backoff,
                max_delay: daemon.max_retry_delay,
            },
        }
    }

    /// Enabled and carrying a schedule expression.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.schedule.is_some()
    }

    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            label: self.id.clone(),
            program: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
        }
    }
}
