// tests/process_runner.rs
#![cfg(unix)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use jobwarden::exec::{CommandSpec, ExitKind, ProcessRunner, RealProcessRunner};
use jobwarden_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

fn sh(script: &str, dir: &Path, timeout: Duration) -> CommandSpec {
    CommandSpec {
        label: "test".to_string(),
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: BTreeMap::new(),
        working_dir: dir.to_path_buf(),
        timeout,
    }
}

fn runner() -> RealProcessRunner {
    RealProcessRunner::new(Duration::from_secs(1))
}

#[tokio::test]
async fn captures_exit_code_and_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let spec = sh(
        "echo hello; echo 'oops' >&2; exit 3",
        dir.path(),
        Duration::from_secs(5),
    );

    let out = with_timeout(runner().run(spec, CancellationToken::new())).await;
    assert_eq!(out.exit, ExitKind::Exited(3));
    assert_eq!(out.stdout, "hello\n");
    assert_eq!(out.stderr, "oops\n");
    assert_eq!(out.describe(), "exited with code 3: oops");
}

#[tokio::test]
async fn zero_exit_is_success() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = with_timeout(runner().run(
        sh("true", dir.path(), Duration::from_secs(5)),
        CancellationToken::new(),
    ))
    .await;
    assert!(out.success());
}

#[tokio::test]
async fn hard_timeout_terminates_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let out = with_timeout(runner().run(
        sh("exec sleep 30", dir.path(), Duration::from_millis(200)),
        CancellationToken::new(),
    ))
    .await;
    assert_eq!(out.exit, ExitKind::TimedOut);
    assert!(!out.success());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn sigterm_ignoring_process_is_killed_after_grace() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let out = with_timeout(runner().run(
        sh("trap '' TERM; while :; do sleep 0.1; done", dir.path(), Duration::from_millis(200)),
        CancellationToken::new(),
    ))
    .await;
    assert_eq!(out.exit, ExitKind::TimedOut);
    // timeout + grace, plus the bounded wait on output readers held open by
    // the orphaned sleep.
    assert!(started.elapsed() < Duration::from_millis(4500));
}

#[tokio::test]
async fn cancellation_stops_the_run() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let out = with_timeout(runner().run(
        sh("exec sleep 30", dir.path(), Duration::from_secs(30)),
        cancel,
    ))
    .await;
    assert_eq!(out.exit, ExitKind::Cancelled);
}

#[tokio::test]
async fn missing_program_is_spawn_failure() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut spec = sh("true", dir.path(), Duration::from_secs(5));
    spec.program = "/nonexistent/jobwarden-test-binary".to_string();

    let out = with_timeout(runner().run(spec, CancellationToken::new())).await;
    assert!(matches!(out.exit, ExitKind::SpawnFailed(_)));
    assert!(out.describe().starts_with("failed to start"));
}

#[tokio::test]
async fn env_and_working_dir_are_applied() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut spec = sh("printf '%s\\n' \"$GREETING\"; pwd", dir.path(), Duration::from_secs(5));
    spec.env.insert("GREETING".to_string(), "hi there".to_string());

    let out = with_timeout(runner().run(spec, CancellationToken::new())).await;
    assert!(out.success());
    let mut lines = out.stdout.lines();
    assert_eq!(lines.next(), Some("hi there"));
    let pwd = lines.next().unwrap();
    let dir_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(pwd.ends_with(&dir_name), "{pwd} vs {dir_name}");
}
