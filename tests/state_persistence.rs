// tests/state_persistence.rs

use std::error::Error;
use std::fs;
use std::sync::Arc;

use jobwarden::fs::mock::{CrashPoint, MockFileSystem};
use jobwarden::state::{StateStore, StatusBook, StatusDocument};
use jobwarden::types::WorkflowStatus;

type TestResult = Result<(), Box<dyn Error>>;

const STATUS: &str = "/state/active-workflows.json";

#[test]
fn crash_mid_write_leaves_previous_document_loadable() -> TestResult {
    let fs = MockFileSystem::new();
    let store: StateStore<StatusDocument> = StateStore::with_fs(STATUS, Arc::new(fs.clone()));
    let book = StatusBook::open(store.clone());

    book.update_workflow("backup", |r| {
        r.status = WorkflowStatus::Success;
        r.failure_count = 0;
    });

    fs.crash_at(CrashPoint::MidWrite);
    // Persistence failure is logged; the in-memory state still moves on.
    book.update_workflow("backup", |r| {
        r.status = WorkflowStatus::Failed;
        r.failure_count = 1;
    });
    assert_eq!(book.workflow("backup").unwrap().failure_count, 1);

    // A restarted process sees the last fully written document.
    let reloaded = StatusBook::open(store.clone());
    let rec = reloaded.workflow("backup").unwrap();
    assert_eq!(rec.status, WorkflowStatus::Success);
    assert_eq!(rec.failure_count, 0);

    // The torn temp file is left behind but never read.
    assert!(fs.paths().iter().any(|p| p.to_string_lossy().ends_with(".tmp")));
    Ok(())
}

#[test]
fn next_successful_save_writes_everything() -> TestResult {
    let fs = MockFileSystem::new();
    let store: StateStore<StatusDocument> = StateStore::with_fs(STATUS, Arc::new(fs.clone()));
    let book = StatusBook::open(store.clone());

    fs.crash_at(CrashPoint::BeforeRename);
    book.update_workflow("a", |r| r.failure_count = 1);
    assert!(book.flush().is_err());

    fs.crash_at(CrashPoint::Never);
    book.update_workflow("b", |r| r.failure_count = 2);

    let doc = store.load();
    assert_eq!(doc.workflows["a"].failure_count, 1);
    assert_eq!(doc.workflows["b"].failure_count, 2);
    Ok(())
}

#[test]
fn corrupt_file_on_disk_falls_back_to_empty_state() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("active-workflows.json");
    fs::write(&path, "{ \"workflows\": { \"a\": ")?;

    let book = StatusBook::open(StateStore::new(&path));
    assert!(book.snapshot().workflows.is_empty());

    book.update_workflow("a", |r| r.failure_count = 4);
    let text = fs::read_to_string(&path)?;
    assert!(text.contains("\"failureCount\": 4"));
    Ok(())
}

#[test]
fn creates_missing_state_directory() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/state/active-workflows.json");
    let store: StateStore<StatusDocument> = StateStore::new(&path);

    store.save(&StatusDocument::default())?;
    assert!(path.exists());

    // No temp files remain next to the document after a clean save.
    let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn persisted_timestamps_round_trip() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("active-workflows.json");
    let book = StatusBook::open(StateStore::new(&path));
    let now = chrono::Utc::now();
    book.update_workflow("a", |r| r.last_run = Some(now));
    book.update_rule("disk", |c| {
        c.last_invocation = Some(now);
        c.invocation_count = 1;
        c.window_start = Some(now);
    });

    let reopened = StatusBook::open(StateStore::new(&path));
    assert_eq!(reopened.workflow("a").unwrap().last_run, Some(now));
    assert_eq!(reopened.rule_counters("disk").last_invocation, Some(now));

    let text = fs::read_to_string(&path)?;
    for key in ["lastRun", "lastInvocation", "invocationCount", "windowStart", "lastUpdate"] {
        assert!(text.contains(key), "missing {key} in {text}");
    }
    Ok(())
}
