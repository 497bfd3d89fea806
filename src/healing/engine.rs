// src/healing/engine.rs

//! The diagnose-and-repair cycle.
//!
//! Each cycle takes one [`Diagnostics`] snapshot, evaluates every rule
//! against it, and walks the violated rules from highest to lowest severity
//! (declaration order breaks ties). A violated rule fires only when its
//! cooldown has elapsed and its daily cap is not exhausted. Rules are
//! attempted one after another, never in parallel, and a failing action
//! never aborts the rest of the cycle.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{JobwardenError, Result};
use crate::healing::actions::ActionRegistry;
use crate::healing::diagnostics::{Diagnostics, DiagnosticsSource};
use crate::healing::rule::{Gate, HealingRule, record_invocation};
use crate::notify::Notifier;
use crate::state::{RuleCounters, StatusBook};
use crate::types::{CooldownPolicy, Severity};

/// What happened to one rule during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    /// Violated but gated by cooldown or the daily cap.
    Skipped(Gate),
    /// Violated but its action id resolves to nothing.
    UnknownAction,
    Fixed,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Violated rules in the order they were processed.
    pub violated: Vec<(String, RuleVerdict)>,
}

impl CycleReport {
    /// Ids of rules whose action actually ran, in firing order.
    pub fn attempted(&self) -> Vec<&str> {
        self.violated
            .iter()
            .filter(|(_, v)| matches!(v, RuleVerdict::Fixed | RuleVerdict::Failed(_)))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn verdict(&self, rule_id: &str) -> Option<&RuleVerdict> {
        self.violated
            .iter()
            .find(|(id, _)| id == rule_id)
            .map(|(_, v)| v)
    }
}

/// A rule together with its persisted counters, for status output.
#[derive(Debug, Clone)]
pub struct RuleStatus {
    pub rule: HealingRule,
    pub counters: RuleCounters,
    pub gate: Gate,
}

pub struct HealingEngine {
    rules: Vec<HealingRule>,
    actions: ActionRegistry,
    source: Arc<dyn DiagnosticsSource>,
    book: Arc<StatusBook>,
    notifier: Notifier,
    policy: CooldownPolicy,
    cancel: CancellationToken,
}

impl HealingEngine {
    pub fn new(
        rules: Vec<HealingRule>,
        actions: ActionRegistry,
        source: Arc<dyn DiagnosticsSource>,
        book: Arc<StatusBook>,
        notifier: Notifier,
    ) -> Self {
        Self {
            rules,
            actions,
            source,
            book,
            notifier,
            policy: CooldownPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: CooldownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token whose children are handed to running actions.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn rules(&self) -> &[HealingRule] {
        &self.rules
    }

    /// Collect diagnostics and run one cycle at the current time.
    pub async fn cycle(&self) -> CycleReport {
        let diagnostics = self.source.collect().await;
        self.cycle_at(Utc::now(), &diagnostics).await
    }

    /// Run one cycle against a given snapshot as if the clock read `now`.
    pub async fn cycle_at(&self, now: DateTime<Utc>, diagnostics: &Diagnostics) -> CycleReport {
        let mut violated: Vec<&HealingRule> = self
            .rules
            .iter()
            .filter(|r| r.condition.evaluate(diagnostics))
            .collect();
        // Stable: equal severities keep declaration order.
        violated.sort_by_key(|r| Reverse(r.severity));

        if violated.is_empty() {
            debug!("healing cycle: all rules healthy");
        } else {
            info!(
                violated = ?violated.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                "healing cycle found violated rules"
            );
        }

        let mut report = CycleReport::default();
        for rule in violated {
            let verdict = self.attempt(rule, now).await;
            report.violated.push((rule.id.clone(), verdict));
        }
        report
    }

    /// Attempt `rule_id`'s remediation regardless of its condition. Cooldown
    /// and the daily cap still apply.
    pub async fn force(&self, rule_id: &str) -> Result<RuleVerdict> {
        let rule = self
            .rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| JobwardenError::RuleNotFound(rule_id.to_string()))?;
        Ok(self.attempt(rule, Utc::now()).await)
    }

    /// Run the cycle every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        info!(
            rules = self.rules.len(),
            interval_ms = interval.as_millis() as u64,
            "healing engine started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.cycle().await;
                }
            }
        }
        info!("healing engine stopped");
    }

    async fn attempt(&self, rule: &HealingRule, now: DateTime<Utc>) -> RuleVerdict {
        let counters = self.book.rule_counters(&rule.id);
        let gate = rule.gate(&counters, now);
        if gate != Gate::Ready {
            info!(rule = %rule.id, %gate, "skipping remediation");
            return RuleVerdict::Skipped(gate);
        }

        let Some(action) = self.actions.resolve(&rule.action) else {
            let err = JobwardenError::UnknownAction {
                rule: rule.id.clone(),
                action: rule.action.clone(),
            };
            error!(error = %err, "cannot remediate");
            return RuleVerdict::UnknownAction;
        };

        info!(
            rule = %rule.id,
            action = %rule.action,
            condition = %rule.condition,
            "attempting remediation: {}",
            rule.description
        );
        let started = Instant::now();
        let result = action.execute(self.cancel.child_token()).await;
        let completed = now + TimeDelta::from_std(started.elapsed()).unwrap_or_default();

        match result {
            Ok(()) => {
                self.book
                    .update_rule(&rule.id, |c| record_invocation(c, completed));
                info!(rule = %rule.id, "remediation succeeded");
                self.notifier
                    .notify(&format!("{} - FIXED", rule.description), Severity::Success)
                    .await;
                RuleVerdict::Fixed
            }
            Err(e) => {
                let reason = match e {
                    JobwardenError::RemediationFailed(msg) => msg,
                    other => other.to_string(),
                };
                if self.policy == CooldownPolicy::AnyAttempt {
                    self.book
                        .update_rule(&rule.id, |c| record_invocation(c, completed));
                }
                warn!(rule = %rule.id, error = %reason, "remediation failed");
                self.notifier
                    .notify(
                        &format!("{} - FAILED: {reason}", rule.description),
                        Severity::Error,
                    )
                    .await;
                RuleVerdict::Failed(reason)
            }
        }
    }
}
