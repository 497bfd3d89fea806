// src/healing/rule.rs

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::RuleConfig;
use crate::healing::condition::Condition;
use crate::state::RuleCounters;

/// Length of the window `max_daily` applies to.
pub fn daily_window() -> TimeDelta {
    TimeDelta::hours(24)
}

/// A validated healing rule.
#[derive(Debug, Clone, PartialEq)]
pub struct HealingRule {
    pub id: String,
    pub condition: Condition,
    /// Key into the action registry.
    pub action: String,
    /// Minimum time between two counted attempts.
    pub cooldown: Duration,
    /// Maximum counted attempts per rolling 24h window.
    pub max_daily: u32,
    pub description: String,
    /// Higher fires first when several rules are violated in one cycle.
    pub severity: u32,
}

impl HealingRule {
    pub fn from_config(cfg: &RuleConfig) -> Result<Self, String> {
        if cfg.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        let condition: Condition = cfg.condition.parse()?;
        let description = if cfg.description.trim().is_empty() {
            cfg.id.clone()
        } else {
            cfg.description.clone()
        };
        let severity = cfg
            .severity
            .unwrap_or_else(|| condition.metric.default_severity());

        Ok(Self {
            id: cfg.id.clone(),
            condition,
            action: cfg.action.clone(),
            cooldown: cfg.cooldown,
            max_daily: cfg.max_daily,
            description,
            severity,
        })
    }

    fn cooldown_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.cooldown).unwrap_or(TimeDelta::MAX)
    }

    /// Whether an attempt may start at `now` given the rule's counters.
    ///
    /// The condition itself is not consulted here.
    pub fn gate(&self, counters: &RuleCounters, now: DateTime<Utc>) -> Gate {
        if let Some(last) = counters.last_invocation {
            let cooldown = self.cooldown_delta();
            if now.signed_duration_since(last) < cooldown {
                return Gate::CoolingDown {
                    until: last
                        .checked_add_signed(cooldown)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                };
            }
        }

        if let Some(start) = counters.window_start {
            let in_window = now.signed_duration_since(start) < daily_window();
            if in_window && counters.invocation_count >= self.max_daily {
                return Gate::CapReached {
                    resets_at: start
                        .checked_add_signed(daily_window())
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                };
            }
        }

        Gate::Ready
    }
}

/// Count one attempt completed at `at`, opening a new 24h window when the
/// previous one has expired.
pub fn record_invocation(counters: &mut RuleCounters, at: DateTime<Utc>) {
    match counters.window_start {
        Some(start) if at.signed_duration_since(start) < daily_window() => {
            counters.invocation_count = counters.invocation_count.saturating_add(1);
        }
        _ => {
            counters.window_start = Some(at);
            counters.invocation_count = 1;
        }
    }
    counters.last_invocation = Some(at);
}

/// Result of [`HealingRule::gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Ready,
    CoolingDown { until: DateTime<Utc> },
    CapReached { resets_at: DateTime<Utc> },
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Ready => f.write_str("ready"),
            Gate::CoolingDown { until } => write!(f, "cooling down until {}", until.to_rfc3339()),
            Gate::CapReached { resets_at } => {
                write!(f, "daily cap reached until {}", resets_at.to_rfc3339())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn rule(cooldown_mins: u64, max_daily: u32) -> HealingRule {
        HealingRule {
            id: "disk".into(),
            condition: "disk_usage > 85".parse().unwrap(),
            action: "cleanup".into(),
            cooldown: Duration::from_secs(cooldown_mins * 60),
            max_daily,
            description: "disk".into(),
            severity: 80,
        }
    }

    fn t(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(mins)
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let r = rule(30, 10);
        let mut c = RuleCounters::default();
        assert_eq!(r.gate(&c, t(0)), Gate::Ready);

        record_invocation(&mut c, t(0));
        assert_eq!(r.gate(&c, t(10)), Gate::CoolingDown { until: t(30) });
        assert_eq!(r.gate(&c, t(31)), Gate::Ready);
    }

    #[test]
    fn daily_cap_resets_after_window() {
        let r = rule(0, 2);
        let mut c = RuleCounters::default();
        record_invocation(&mut c, t(0));
        record_invocation(&mut c, t(60));
        assert_eq!(
            r.gate(&c, t(120)),
            Gate::CapReached {
                resets_at: t(24 * 60)
            }
        );
        assert_eq!(r.gate(&c, t(24 * 60)), Gate::Ready);

        record_invocation(&mut c, t(24 * 60));
        assert_eq!(c.invocation_count, 1);
        assert_eq!(c.window_start, Some(t(24 * 60)));
    }

    #[test]
    fn window_near_end_of_time_saturates() {
        let r = rule(0, 2);
        let start = DateTime::<Utc>::MAX_UTC - TimeDelta::hours(1);
        let c = RuleCounters {
            last_invocation: None,
            invocation_count: 2,
            window_start: Some(start),
        };
        assert_eq!(
            r.gate(&c, start + TimeDelta::minutes(30)),
            Gate::CapReached {
                resets_at: DateTime::<Utc>::MAX_UTC
            }
        );
    }

    #[test]
    fn description_and_severity_defaults() {
        let cfg: RuleConfig = toml::from_str(
            r#"
            id = "backend-down"
            condition = "backend_status = down"
            action = "restart_backend"
            "#,
        )
        .unwrap();
        let r = HealingRule::from_config(&cfg).unwrap();
        assert_eq!(r.description, "backend-down");
        assert_eq!(r.severity, 100);
        assert_eq!(r.max_daily, 10);
    }
}
