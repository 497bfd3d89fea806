// src/healing/mod.rs

//! Self-healing: typed rule conditions, diagnostics collection, remediation
//! actions and the gated repair cycle.

pub mod actions;
pub mod condition;
pub mod diagnostics;
pub mod engine;
pub mod rule;

pub use actions::{ActionRegistry, CommandAction, RemediationAction};
pub use condition::{Comparator, Condition, Metric, MetricValue};
pub use diagnostics::{Diagnostics, DiagnosticsSource, HostDiagnostics};
pub use engine::{CycleReport, HealingEngine, RuleStatus, RuleVerdict};
pub use rule::{Gate, HealingRule, daily_window, record_invocation};
