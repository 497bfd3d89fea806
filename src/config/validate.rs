// src/config/validate.rs

use std::collections::HashSet;

use chrono_tz::Tz;
use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobwardenError, Result};
use crate::healing::HealingRule;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobwardenError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let rules = build_rules(&raw)?;
        warn_on_unknown_actions(&raw);
        Ok(ConfigFile::new_unchecked(raw, rules))
    }
}

/// Semantic checks that make the whole config unusable.
///
/// Schedule expressions and action references are deliberately *not*
/// checked here: a bad one only disables the offending workflow or rule
/// (see `Scheduler::start` and `HealingEngine::cycle_at`).
fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_workflows(cfg)?;
    validate_daemon_section(cfg)?;
    validate_workflows(cfg)?;
    validate_actions(cfg)?;
    Ok(())
}

fn ensure_has_workflows(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workflow.is_empty() {
        return Err(JobwardenError::ConfigError(
            "config must contain at least one [workflow.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_daemon_section(cfg: &RawConfigFile) -> Result<()> {
    cfg.daemon.timezone.parse::<Tz>().map_err(|_| {
        JobwardenError::ConfigError(format!(
            "[daemon].timezone '{}' is not a known IANA timezone",
            cfg.daemon.timezone
        ))
    })?;

    if cfg.daemon.retry_delay > cfg.daemon.max_retry_delay {
        return Err(JobwardenError::ConfigError(
            "[daemon].retry_delay must not exceed [daemon].max_retry_delay".to_string(),
        ));
    }

    if cfg.monitor.interval.is_zero() || cfg.healing.interval.is_zero() {
        return Err(JobwardenError::ConfigError(
            "[monitor].interval and [healing].interval must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflows(cfg: &RawConfigFile) -> Result<()> {
    for (id, wf) in cfg.workflow.iter() {
        if id.trim().is_empty() {
            return Err(JobwardenError::ConfigError(
                "workflow ids must not be empty".to_string(),
            ));
        }
        if wf.command.trim().is_empty() {
            return Err(JobwardenError::ConfigError(format!(
                "workflow '{id}' has an empty `command`"
            )));
        }
        if wf.timeout.is_zero() {
            return Err(JobwardenError::ConfigError(format!(
                "workflow '{id}' must have a `timeout` > 0"
            )));
        }
    }
    Ok(())
}

fn validate_actions(cfg: &RawConfigFile) -> Result<()> {
    for (id, action) in cfg.action.iter() {
        if action.command.trim().is_empty() {
            return Err(JobwardenError::ConfigError(format!(
                "action '{id}' has an empty `command`"
            )));
        }
        if action.timeout.is_zero() {
            return Err(JobwardenError::ConfigError(format!(
                "action '{id}' must have a `timeout` > 0"
            )));
        }
    }
    Ok(())
}

fn build_rules(cfg: &RawConfigFile) -> Result<Vec<HealingRule>> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(cfg.rule.len());

    for rule_cfg in cfg.rule.iter() {
        if !seen.insert(rule_cfg.id.as_str()) {
            return Err(JobwardenError::ConfigError(format!(
                "healing rule '{}' is declared more than once",
                rule_cfg.id
            )));
        }
        if rule_cfg.max_daily == 0 {
            return Err(JobwardenError::ConfigError(format!(
                "healing rule '{}' must have `max_daily` >= 1",
                rule_cfg.id
            )));
        }
        let rule = HealingRule::from_config(rule_cfg).map_err(|e| {
            JobwardenError::ConfigError(format!("healing rule '{}': {e}", rule_cfg.id))
        })?;
        rules.push(rule);
    }

    Ok(rules)
}

fn warn_on_unknown_actions(cfg: &RawConfigFile) {
    for rule in cfg.rule.iter() {
        if !cfg.action.contains_key(&rule.action) {
            warn!(
                rule = %rule.id,
                action = %rule.action,
                "healing rule references an unknown action; it will be skipped every cycle"
            );
        }
    }
}
