// tests/executor_retry.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use jobwarden::config::ConfigFile;
use jobwarden::exec::{
    ExitKind, Executor, ExecutorOptions, RunOutcome, RunningSet, TriggerReason,
};
use jobwarden::state::{StateStore, StatusBook, StatusDocument};
use jobwarden::types::{Severity, WorkflowStatus};
use jobwarden::workflow::WorkflowRegistry;
use jobwarden_test_utils::builders::{ConfigFileBuilder, WorkflowConfigBuilder};
use jobwarden_test_utils::fake_runner::FakeProcessRunner;
use jobwarden_test_utils::fakes::{RecordingSink, recording_notifier};
use jobwarden_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type TestResult = Result<(), Box<dyn Error>>;

fn backup_config(dir: &std::path::Path, max_retries: u32) -> ConfigFile {
    ConfigFileBuilder::new()
        .state_dir(dir)
        .with_workflow(
            "backup",
            WorkflowConfigBuilder::new("backup.sh")
                .name("Nightly backup")
                .max_retries(max_retries)
                .retry_delay(Duration::from_millis(10))
                .build(),
        )
        .build()
}

fn executor(
    cfg: &ConfigFile,
    runner: &FakeProcessRunner,
    schedule_retries: bool,
) -> (Executor, Arc<RecordingSink>) {
    let (notifier, sink) = recording_notifier();
    let book = Arc::new(StatusBook::open(StateStore::new(cfg.status_path())));
    let exec = Executor::with_options(
        WorkflowRegistry::from_config(cfg),
        Arc::new(runner.clone()),
        book,
        notifier,
        RunningSet::new(),
        CancellationToken::new(),
        TaskTracker::new(),
        ExecutorOptions { schedule_retries },
    );
    (exec, sink)
}

#[tokio::test]
async fn failing_workflow_retries_until_limit_then_notifies_once() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = backup_config(dir.path(), 2);
    let runner = FakeProcessRunner::failing(1);
    let (exec, sink) = executor(&cfg, &runner, true);

    let first = exec.run("backup", TriggerReason::Schedule).await?;
    assert_eq!(
        first,
        RunOutcome::Failed {
            failures: 1,
            retry_in: Some(Duration::from_millis(10)),
        }
    );

    exec.tracker().close();
    with_timeout(exec.tracker().wait()).await;

    assert_eq!(runner.spawn_count(), 2);
    let rec = exec.book().workflow("backup").unwrap();
    assert_eq!(rec.status, WorkflowStatus::Failed);
    assert_eq!(rec.failure_count, 2);

    let errors = sink.with_severity(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Nightly backup"));
    assert!(errors[0].contains("exceeded retry limit"));

    let on_disk: StatusDocument = StateStore::new(cfg.status_path()).load();
    assert_eq!(on_disk.workflows["backup"].failure_count, 2);
    assert_eq!(on_disk.workflows["backup"].status, WorkflowStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn success_resets_failure_counter_and_notifies() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = backup_config(dir.path(), 3);
    let runner = FakeProcessRunner::succeeding().then([ExitKind::Exited(1)]);
    let (exec, sink) = executor(&cfg, &runner, true);

    let first = exec.run("backup", TriggerReason::Schedule).await?;
    assert!(matches!(first, RunOutcome::Failed { failures: 1, .. }));

    exec.tracker().close();
    with_timeout(exec.tracker().wait()).await;

    assert_eq!(runner.spawn_count(), 2);
    let rec = exec.book().workflow("backup").unwrap();
    assert_eq!(rec.status, WorkflowStatus::Success);
    assert_eq!(rec.failure_count, 0);
    assert_eq!(
        sink.with_severity(Severity::Success),
        vec!["Nightly backup completed successfully".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn counter_stays_at_limit_until_manual_trigger() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = backup_config(dir.path(), 2);
    let runner = FakeProcessRunner::failing(1);
    let (exec, _sink) = executor(&cfg, &runner, false);

    assert!(matches!(
        exec.run("backup", TriggerReason::Schedule).await?,
        RunOutcome::Failed { failures: 1, retry_in: None }
    ));
    assert_eq!(
        exec.run("backup", TriggerReason::Schedule).await?,
        RunOutcome::RetriesExhausted { failures: 2 }
    );
    // A scheduled run past the limit keeps counting up.
    assert_eq!(
        exec.run("backup", TriggerReason::Schedule).await?,
        RunOutcome::RetriesExhausted { failures: 3 }
    );

    let outcome = exec.trigger("backup").await?;
    assert!(matches!(outcome, RunOutcome::Failed { failures: 1, .. }));
    assert_eq!(exec.book().workflow("backup").unwrap().failure_count, 1);
    Ok(())
}

#[tokio::test]
async fn timeout_counts_as_failure() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = backup_config(dir.path(), 5);
    let runner = FakeProcessRunner::with_default(ExitKind::TimedOut);
    let (exec, _sink) = executor(&cfg, &runner, false);

    let outcome = exec.run("backup", TriggerReason::Schedule).await?;
    assert!(matches!(outcome, RunOutcome::Failed { failures: 1, .. }));
    Ok(())
}
