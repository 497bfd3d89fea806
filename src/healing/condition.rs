// src/healing/condition.rs

//! Typed healing-rule conditions.
//!
//! A condition is parsed once from its config string (`"disk_usage > 85"`)
//! into a `(Metric, Comparator, MetricValue)` triple and evaluated by a pure
//! function over a [`Diagnostics`] snapshot.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::healing::diagnostics::Diagnostics;

/// Metrics the diagnostics collector knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Percentage of the monitored filesystem in use.
    DiskUsage,
    /// Percentage of physical memory in use.
    MemoryUsage,
    /// `"up"` / `"down"` from the backend health endpoint.
    BackendStatus,
    /// `"up"` / `"down"` from the orchestrator health endpoint.
    OrchestratorStatus,
    /// Sum of consecutive-failure counters across all workflows.
    WorkflowFailureRate,
    /// Number of workflows currently executing.
    RunningWorkflows,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::DiskUsage,
        Metric::MemoryUsage,
        Metric::BackendStatus,
        Metric::OrchestratorStatus,
        Metric::WorkflowFailureRate,
        Metric::RunningWorkflows,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::DiskUsage => "disk_usage",
            Metric::MemoryUsage => "memory_usage",
            Metric::BackendStatus => "backend_status",
            Metric::OrchestratorStatus => "orchestrator_status",
            Metric::WorkflowFailureRate => "workflow_failure_rate",
            Metric::RunningWorkflows => "running_workflows",
        }
    }

    /// Severity a rule on this metric gets when the config does not set one.
    ///
    /// Reachability failures outrank resource pressure, which outranks
    /// workflow failures.
    pub fn default_severity(self) -> u32 {
        match self {
            Metric::BackendStatus => 100,
            Metric::OrchestratorStatus => 90,
            Metric::DiskUsage => 80,
            Metric::MemoryUsage => 70,
            Metric::WorkflowFailureRate => 60,
            Metric::RunningWorkflows => 50,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Metric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown metric '{s}' (expected one of {})", known.join(", "))
            })
    }
}

/// A single metric reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn text(s: impl Into<String>) -> Self {
        MetricValue::Text(s.into())
    }

    /// Parse a threshold literal: numbers stay numeric, everything else is
    /// compared as lowercase text.
    fn parse_literal(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => MetricValue::Number(n),
            _ => MetricValue::Text(raw.trim_matches('"').to_lowercase()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) if n.fract() == 0.0 => write!(f, "{n:.0}"),
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            "=" | "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            other => Err(format!("unknown comparator '{other}'")),
        }
    }
}

/// `metric comparator threshold`, e.g. `disk_usage > 85`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: Metric,
    pub comparator: Comparator,
    pub threshold: MetricValue,
}

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|==|!=|>|<|=)\s*(\S+)\s*$")
        .expect("condition regex is valid")
});

impl Condition {
    pub fn new(metric: Metric, comparator: Comparator, threshold: MetricValue) -> Self {
        Self {
            metric,
            comparator,
            threshold,
        }
    }

    /// Whether the condition holds against the snapshot.
    ///
    /// A metric missing from the snapshot never satisfies a condition, and
    /// ordering comparisons between non-numeric values are false.
    pub fn evaluate(&self, diagnostics: &Diagnostics) -> bool {
        let Some(value) = diagnostics.get(self.metric) else {
            return false;
        };
        compare(value, self.comparator, &self.threshold)
    }
}

fn compare(value: &MetricValue, comparator: Comparator, threshold: &MetricValue) -> bool {
    match (value, threshold) {
        (MetricValue::Number(v), MetricValue::Number(t)) => match comparator {
            Comparator::Gt => v > t,
            Comparator::Ge => v >= t,
            Comparator::Lt => v < t,
            Comparator::Le => v <= t,
            Comparator::Eq => v == t,
            Comparator::Ne => v != t,
        },
        (MetricValue::Text(v), MetricValue::Text(t)) => match comparator {
            Comparator::Eq => v.eq_ignore_ascii_case(t),
            Comparator::Ne => !v.eq_ignore_ascii_case(t),
            _ => false,
        },
        _ => false,
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = CONDITION_RE.captures(s).ok_or_else(|| {
            format!("condition '{s}' is not of the form '<metric> <op> <threshold>'")
        })?;

        let metric: Metric = caps[1].parse()?;
        let comparator: Comparator = caps[2].parse()?;
        let threshold = MetricValue::parse_literal(&caps[3]);

        let ordering = matches!(
            comparator,
            Comparator::Gt | Comparator::Ge | Comparator::Lt | Comparator::Le
        );
        if ordering && matches!(threshold, MetricValue::Text(_)) {
            return Err(format!(
                "condition '{s}' compares with '{}' but the threshold is not numeric",
                comparator.symbol()
            ));
        }

        Ok(Condition::new(metric, comparator, threshold))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.metric,
            self.comparator.symbol(),
            self.threshold
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Diagnostics {
        let mut d = Diagnostics::default();
        d.insert(Metric::DiskUsage, MetricValue::Number(90.0));
        d.insert(Metric::BackendStatus, MetricValue::text("down"));
        d
    }

    #[test]
    fn parses_numeric_and_text_conditions() {
        let c: Condition = "disk_usage > 85".parse().unwrap();
        assert_eq!(c.metric, Metric::DiskUsage);
        assert_eq!(c.comparator, Comparator::Gt);
        assert_eq!(c.threshold, MetricValue::Number(85.0));

        let c: Condition = "backend_status = DOWN".parse().unwrap();
        assert_eq!(c.threshold, MetricValue::text("down"));
        assert_eq!(c.to_string(), "backend_status = down");
    }

    #[test]
    fn rejects_garbage_and_unknown_metrics() {
        assert!("disk_usage".parse::<Condition>().is_err());
        assert!("cpu_usage > 5".parse::<Condition>().is_err());
        assert!("backend_status > down".parse::<Condition>().is_err());
    }

    #[test]
    fn evaluates_against_snapshot() {
        let d = snapshot();
        assert!("disk_usage > 85".parse::<Condition>().unwrap().evaluate(&d));
        assert!(!"disk_usage > 95".parse::<Condition>().unwrap().evaluate(&d));
        assert!("backend_status = down".parse::<Condition>().unwrap().evaluate(&d));
        assert!(!"backend_status != down".parse::<Condition>().unwrap().evaluate(&d));
    }

    #[test]
    fn missing_metric_never_matches() {
        let d = snapshot();
        let c: Condition = "orchestrator_status = down".parse().unwrap();
        assert!(!c.evaluate(&d));
        let c: Condition = "memory_usage < 100".parse().unwrap();
        assert!(!c.evaluate(&d));
    }
}
