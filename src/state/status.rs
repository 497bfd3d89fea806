// src/state/status.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::errors::Result;
use crate::state::store::StateStore;
use crate::types::WorkflowStatus;

/// Runtime record of one workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRecord {
    pub status: WorkflowStatus,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// Consecutive failed attempts since the last success or manual trigger.
    #[serde(default)]
    pub failure_count: u32,
}

/// Invocation bookkeeping of one healing rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCounters {
    /// Completion time of the most recent counted remediation attempt.
    #[serde(default)]
    pub last_invocation: Option<DateTime<Utc>>,
    /// Attempts counted inside the current 24h window.
    #[serde(default)]
    pub invocation_count: u32,
    /// Start of the current 24h window.
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
}

/// Contents of `active-workflows.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    #[serde(default)]
    pub workflows: BTreeMap<String, WorkflowRecord>,
    #[serde(default)]
    pub healing: BTreeMap<String, RuleCounters>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

/// Contents of `health-status.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Disk usage percentage of the monitored mount.
    pub disk: f64,
    /// Memory usage percentage.
    pub memory: f64,
    pub running_workflows: usize,
    pub timestamp: Option<DateTime<Utc>>,
}

/// In-memory owner of the [`StatusDocument`].
///
/// Every mutation persists the whole document while the lock is held, so
/// concurrent writers can never interleave partial updates on disk. When a
/// save fails the in-memory copy stays authoritative and the failure is
/// logged; the next successful mutation writes everything again.
///
/// One-shot commands (`trigger`, `heal`) write the same file as a live
/// daemon. Before every read and write the book re-reads the file and adopts
/// the on-disk version of each entry it has no unsaved change for, so the
/// other process's outcomes and rule stamps are neither overwritten nor
/// ignored.
#[derive(Debug)]
pub struct StatusBook {
    store: StateStore<StatusDocument>,
    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    doc: StatusDocument,
    /// Workflow ids changed here but not yet on disk.
    unsaved_workflows: BTreeSet<String>,
    /// Rule ids changed here but not yet on disk.
    unsaved_rules: BTreeSet<String>,
}

impl Ledger {
    fn adopt(&mut self, disk: StatusDocument) {
        for (id, record) in disk.workflows {
            if !self.unsaved_workflows.contains(&id) {
                self.doc.workflows.insert(id, record);
            }
        }
        for (id, counters) in disk.healing {
            if !self.unsaved_rules.contains(&id) {
                self.doc.healing.insert(id, counters);
            }
        }
    }
}

impl StatusBook {
    pub fn open(store: StateStore<StatusDocument>) -> Self {
        let doc = store.load();
        Self {
            store,
            ledger: Mutex::new(Ledger {
                doc,
                ..Ledger::default()
            }),
        }
    }

    /// Downgrade every workflow recorded as `running` to `failed`.
    ///
    /// Only the daemon calls this at startup: a record left `running` cannot
    /// belong to a live run of a fresh daemon, while a one-shot command may
    /// be looking at a run the daemon still owns. Does not persist.
    pub fn recover_stale(&self) -> usize {
        let mut ledger = self.fresh();
        let Ledger {
            doc,
            unsaved_workflows,
            ..
        } = &mut *ledger;
        let mut recovered = 0;
        for (id, record) in doc.workflows.iter_mut() {
            if record.status == WorkflowStatus::Running {
                warn!(workflow = %id, "workflow was running when the daemon stopped; marking failed");
                record.status = WorkflowStatus::Failed;
                unsaved_workflows.insert(id.clone());
                recovered += 1;
            }
        }
        recovered
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock and pick up whatever other processes persisted since the last
    /// access.
    fn fresh(&self) -> MutexGuard<'_, Ledger> {
        let mut ledger = self.lock();
        let disk = self.store.load();
        ledger.adopt(disk);
        ledger
    }

    /// Ensure a record exists for every id. Does not persist.
    pub fn register_workflows<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let mut ledger = self.lock();
        for id in ids {
            ledger.doc.workflows.entry(id.to_string()).or_default();
        }
    }

    pub fn workflow(&self, id: &str) -> Option<WorkflowRecord> {
        self.fresh().doc.workflows.get(id).cloned()
    }

    pub fn snapshot(&self) -> StatusDocument {
        self.fresh().doc.clone()
    }

    /// Sum of consecutive-failure counters across all workflows.
    pub fn total_failures(&self) -> u32 {
        self.fresh()
            .doc
            .workflows
            .values()
            .map(|r| r.failure_count)
            .sum()
    }

    pub fn rule_counters(&self, rule_id: &str) -> RuleCounters {
        self.fresh()
            .doc
            .healing
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutate one workflow record and persist.
    pub fn update_workflow<R>(&self, id: &str, f: impl FnOnce(&mut WorkflowRecord) -> R) -> R {
        let mut ledger = self.fresh();
        let out = f(ledger.doc.workflows.entry(id.to_string()).or_default());
        ledger.unsaved_workflows.insert(id.to_string());
        self.persist_locked(&mut ledger);
        out
    }

    /// Mutate one rule's counters and persist.
    pub fn update_rule<R>(&self, rule_id: &str, f: impl FnOnce(&mut RuleCounters) -> R) -> R {
        let mut ledger = self.fresh();
        let out = f(ledger.doc.healing.entry(rule_id.to_string()).or_default());
        ledger.unsaved_rules.insert(rule_id.to_string());
        self.persist_locked(&mut ledger);
        out
    }

    /// Write the current document, surfacing the error to the caller.
    pub fn flush(&self) -> Result<()> {
        let mut ledger = self.fresh();
        self.save_locked(&mut ledger)
    }

    fn persist_locked(&self, ledger: &mut Ledger) {
        if let Err(e) = self.save_locked(ledger) {
            error!(
                path = %self.store.path().display(),
                error = %e,
                "failed to persist workflow state; keeping in-memory state"
            );
        }
    }

    fn save_locked(&self, ledger: &mut Ledger) -> Result<()> {
        ledger.doc.last_update = Some(Utc::now());
        self.store.save(&ledger.doc)?;
        ledger.unsaved_workflows.clear();
        ledger.unsaved_rules.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut doc = StatusDocument::default();
        doc.workflows.insert(
            "backup".into(),
            WorkflowRecord {
                status: WorkflowStatus::Failed,
                last_run: None,
                failure_count: 2,
            },
        );
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"failureCount\":2"));
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"lastUpdate\""));
    }

    #[test]
    fn stale_running_status_is_downgraded_on_recovery() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "/s/active-workflows.json",
            r#"{"workflows":{"a":{"status":"running","failureCount":1}}}"#,
        );
        let store = StateStore::with_fs("/s/active-workflows.json", Arc::new(fs.clone()));
        let book = StatusBook::open(store.clone());
        assert_eq!(book.workflow("a").unwrap().status, WorkflowStatus::Running);

        assert_eq!(book.recover_stale(), 1);
        let rec = book.workflow("a").unwrap();
        assert_eq!(rec.status, WorkflowStatus::Failed);
        assert_eq!(rec.failure_count, 1);

        book.flush().unwrap();
        assert_eq!(store.load().workflows["a"].status, WorkflowStatus::Failed);
    }

    #[test]
    fn writes_from_another_book_survive_local_updates() {
        let fs = MockFileSystem::new();
        let store = StateStore::with_fs("/s/active-workflows.json", Arc::new(fs.clone()));
        let daemon = StatusBook::open(store.clone());
        let oneshot = StatusBook::open(store.clone());

        oneshot.update_rule("disk", |c| c.invocation_count = 1);
        oneshot.update_workflow("b", |r| r.status = WorkflowStatus::Success);
        assert_eq!(daemon.rule_counters("disk").invocation_count, 1);

        daemon.update_workflow("a", |r| r.failure_count = 2);
        let doc = store.load();
        assert_eq!(doc.workflows["a"].failure_count, 2);
        assert_eq!(doc.workflows["b"].status, WorkflowStatus::Success);
        assert_eq!(doc.healing["disk"].invocation_count, 1);
    }

    #[test]
    fn updates_are_persisted() {
        let fs = MockFileSystem::new();
        let store = StateStore::with_fs("/s/active-workflows.json", Arc::new(fs.clone()));
        let book = StatusBook::open(store.clone());
        book.update_workflow("a", |r| r.failure_count = 3);

        let reloaded = store.load();
        assert_eq!(reloaded.workflows["a"].failure_count, 3);
        assert!(reloaded.last_update.is_some());
    }
}
