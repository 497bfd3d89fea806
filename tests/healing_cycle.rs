// tests/healing_cycle.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use jobwarden::errors::JobwardenError;
use jobwarden::healing::{
    ActionRegistry, Diagnostics, Gate, HealingEngine, HealingRule, Metric, MetricValue,
    RuleVerdict,
};
use jobwarden::state::{StateStore, StatusBook};
use jobwarden::types::{CooldownPolicy, Severity};
use jobwarden_test_utils::fakes::{FixedDiagnostics, RecordingSink, ScriptedAction, recording_notifier};
use jobwarden_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn t(mins: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap() + TimeDelta::minutes(mins)
}

fn rule(id: &str, condition: &str, action: &str, severity: u32) -> HealingRule {
    HealingRule {
        id: id.to_string(),
        condition: condition.parse().unwrap(),
        action: action.to_string(),
        cooldown: Duration::from_secs(30 * 60),
        max_daily: 10,
        description: format!("{id} remediation"),
        severity,
    }
}

fn unhealthy() -> Diagnostics {
    Diagnostics::default()
        .with(Metric::DiskUsage, MetricValue::Number(91.0))
        .with(Metric::MemoryUsage, MetricValue::Number(40.0))
        .with(Metric::BackendStatus, MetricValue::text("down"))
        .with(Metric::WorkflowFailureRate, MetricValue::Number(0.0))
        .with(Metric::RunningWorkflows, MetricValue::Number(0.0))
}

fn healthy() -> Diagnostics {
    Diagnostics::default()
        .with(Metric::DiskUsage, MetricValue::Number(40.0))
        .with(Metric::MemoryUsage, MetricValue::Number(40.0))
        .with(Metric::BackendStatus, MetricValue::text("up"))
        .with(Metric::WorkflowFailureRate, MetricValue::Number(0.0))
        .with(Metric::RunningWorkflows, MetricValue::Number(0.0))
}

struct Harness {
    engine: HealingEngine,
    book: Arc<StatusBook>,
    log: Arc<Mutex<Vec<String>>>,
    sink: Arc<RecordingSink>,
    _dir: tempfile::TempDir,
}

/// `actions` pairs an action id with whether it succeeds.
fn harness(rules: Vec<HealingRule>, actions: &[(&str, bool)], policy: CooldownPolicy) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let book = Arc::new(StatusBook::open(StateStore::new(
        dir.path().join("active-workflows.json"),
    )));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ActionRegistry::new();
    for (id, ok) in actions {
        registry.register(*id, Arc::new(ScriptedAction::new(id, *ok, log.clone())));
    }
    let (notifier, sink) = recording_notifier();
    let engine = HealingEngine::new(
        rules,
        registry,
        Arc::new(FixedDiagnostics(unhealthy())),
        book.clone(),
        notifier,
    )
    .with_policy(policy);
    Harness {
        engine,
        book,
        log,
        sink,
        _dir: dir,
    }
}

impl Harness {
    fn fired(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn violated_rules_fire_in_descending_severity() -> TestResult {
    init_tracing();
    let h = harness(
        vec![
            rule("disk", "disk_usage > 85", "cleanup", 50),
            rule("backend", "backend_status = down", "restart", 100),
            rule("memory", "memory_usage > 90", "free", 70),
        ],
        &[("cleanup", true), ("restart", true), ("free", true)],
        CooldownPolicy::AnyAttempt,
    );

    let report = h.engine.cycle_at(t(0), &unhealthy()).await;
    assert_eq!(report.attempted(), vec!["backend", "disk"]);
    assert_eq!(h.fired(), vec!["restart", "cleanup"]);
    assert_eq!(report.verdict("memory"), None);
    Ok(())
}

#[tokio::test]
async fn equal_severity_keeps_declaration_order() -> TestResult {
    init_tracing();
    let h = harness(
        vec![
            rule("second-disk", "disk_usage > 80", "b", 80),
            rule("first-disk", "disk_usage > 85", "a", 80),
        ],
        &[("a", true), ("b", true)],
        CooldownPolicy::AnyAttempt,
    );

    h.engine.cycle_at(t(0), &unhealthy()).await;
    assert_eq!(h.fired(), vec!["b", "a"]);
    Ok(())
}

#[tokio::test]
async fn cooldown_gates_repeat_attempts() -> TestResult {
    init_tracing();
    let h = harness(
        vec![rule("disk", "disk_usage > 85", "cleanup", 80)],
        &[("cleanup", true)],
        CooldownPolicy::AnyAttempt,
    );

    let r0 = h.engine.cycle_at(t(0), &unhealthy()).await;
    assert_eq!(r0.verdict("disk"), Some(&RuleVerdict::Fixed));

    let r10 = h.engine.cycle_at(t(10), &unhealthy()).await;
    assert!(matches!(
        r10.verdict("disk"),
        Some(RuleVerdict::Skipped(Gate::CoolingDown { .. }))
    ));

    let r31 = h.engine.cycle_at(t(31), &unhealthy()).await;
    assert_eq!(r31.verdict("disk"), Some(&RuleVerdict::Fixed));

    assert_eq!(h.fired().len(), 2);
    assert_eq!(h.book.rule_counters("disk").invocation_count, 2);
    Ok(())
}

#[tokio::test]
async fn daily_cap_stops_attempts_until_window_expires() -> TestResult {
    init_tracing();
    let mut r = rule("disk", "disk_usage > 85", "cleanup", 80);
    r.cooldown = Duration::ZERO;
    r.max_daily = 2;
    let h = harness(vec![r], &[("cleanup", true)], CooldownPolicy::AnyAttempt);

    h.engine.cycle_at(t(0), &unhealthy()).await;
    h.engine.cycle_at(t(60), &unhealthy()).await;
    let capped = h.engine.cycle_at(t(120), &unhealthy()).await;
    assert!(matches!(
        capped.verdict("disk"),
        Some(RuleVerdict::Skipped(Gate::CapReached { .. }))
    ));
    assert_eq!(h.fired().len(), 2);

    let next_day = h.engine.cycle_at(t(24 * 60 + 1), &unhealthy()).await;
    assert_eq!(next_day.verdict("disk"), Some(&RuleVerdict::Fixed));
    let counters = h.book.rule_counters("disk");
    assert_eq!(counters.invocation_count, 1);
    assert!(counters.window_start.unwrap() >= t(24 * 60 + 1));
    Ok(())
}

#[tokio::test]
async fn unknown_action_is_skipped_and_others_still_fire() -> TestResult {
    init_tracing();
    let h = harness(
        vec![
            rule("backend", "backend_status = down", "restart_backend", 100),
            rule("disk", "disk_usage > 85", "cleanup", 80),
        ],
        &[("cleanup", true)],
        CooldownPolicy::AnyAttempt,
    );

    let report = h.engine.cycle_at(t(0), &unhealthy()).await;
    assert_eq!(report.verdict("backend"), Some(&RuleVerdict::UnknownAction));
    assert_eq!(report.verdict("disk"), Some(&RuleVerdict::Fixed));
    assert_eq!(h.book.rule_counters("backend").invocation_count, 0);
    Ok(())
}

#[tokio::test]
async fn failed_action_notifies_and_cycle_continues() -> TestResult {
    init_tracing();
    let h = harness(
        vec![
            rule("backend", "backend_status = down", "restart", 100),
            rule("disk", "disk_usage > 85", "cleanup", 80),
        ],
        &[("restart", false), ("cleanup", true)],
        CooldownPolicy::AnyAttempt,
    );

    let report = h.engine.cycle_at(t(0), &unhealthy()).await;
    assert_eq!(
        report.verdict("backend"),
        Some(&RuleVerdict::Failed("restart exited with code 1".to_string()))
    );
    assert_eq!(report.verdict("disk"), Some(&RuleVerdict::Fixed));

    assert_eq!(
        h.sink.with_severity(Severity::Error),
        vec!["backend remediation - FAILED: restart exited with code 1".to_string()]
    );
    assert_eq!(
        h.sink.with_severity(Severity::Success),
        vec!["disk remediation - FIXED".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn any_attempt_policy_counts_failures_toward_cooldown() -> TestResult {
    init_tracing();
    let h = harness(
        vec![rule("backend", "backend_status = down", "restart", 100)],
        &[("restart", false)],
        CooldownPolicy::AnyAttempt,
    );

    h.engine.cycle_at(t(0), &unhealthy()).await;
    let second = h.engine.cycle_at(t(5), &unhealthy()).await;
    assert!(matches!(
        second.verdict("backend"),
        Some(RuleVerdict::Skipped(Gate::CoolingDown { .. }))
    ));
    assert_eq!(h.fired().len(), 1);
    Ok(())
}

#[tokio::test]
async fn success_only_policy_retries_failed_actions_next_cycle() -> TestResult {
    init_tracing();
    let h = harness(
        vec![rule("backend", "backend_status = down", "restart", 100)],
        &[("restart", false)],
        CooldownPolicy::SuccessOnly,
    );

    h.engine.cycle_at(t(0), &unhealthy()).await;
    let second = h.engine.cycle_at(t(5), &unhealthy()).await;
    assert!(matches!(second.verdict("backend"), Some(RuleVerdict::Failed(_))));
    assert_eq!(h.fired().len(), 2);
    assert_eq!(h.book.rule_counters("backend").invocation_count, 0);
    Ok(())
}

#[tokio::test]
async fn healthy_snapshot_runs_nothing() -> TestResult {
    init_tracing();
    let h = harness(
        vec![
            rule("backend", "backend_status = down", "restart", 100),
            rule("disk", "disk_usage > 85", "cleanup", 80),
        ],
        &[("restart", true), ("cleanup", true)],
        CooldownPolicy::AnyAttempt,
    );

    let report = h.engine.cycle_at(t(0), &healthy()).await;
    assert!(report.violated.is_empty());
    assert!(h.fired().is_empty());
    assert!(h.sink.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn cycle_collects_from_source() -> TestResult {
    init_tracing();
    let h = harness(
        vec![rule("disk", "disk_usage > 85", "cleanup", 80)],
        &[("cleanup", true)],
        CooldownPolicy::AnyAttempt,
    );

    let report = h.engine.cycle().await;
    assert_eq!(report.attempted(), vec!["disk"]);
    Ok(())
}

#[tokio::test]
async fn force_ignores_condition_but_respects_cooldown() -> TestResult {
    init_tracing();
    let h = harness(
        vec![rule("memory", "memory_usage > 90", "free", 70)],
        &[("free", true)],
        CooldownPolicy::AnyAttempt,
    );

    assert_eq!(h.engine.force("memory").await?, RuleVerdict::Fixed);
    assert!(matches!(
        h.engine.force("memory").await?,
        RuleVerdict::Skipped(Gate::CoolingDown { .. })
    ));

    let err = h.engine.force("nope").await.unwrap_err();
    assert!(matches!(err, JobwardenError::RuleNotFound(id) if id == "nope"));
    Ok(())
}
