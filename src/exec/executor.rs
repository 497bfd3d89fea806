// src/exec/executor.rs

//! Runs one workflow end to end.
//!
//! A run claims the workflow id in the [`RunningSet`], marks the workflow
//! `running`, spawns the command through the [`ProcessRunner`] and records
//! the outcome. Failures below `max_retries` schedule a single delayed retry
//! as an independent task; the retry goes through the same gate, so it is
//! skipped if another run of the same id is in flight when it fires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::errors::{JobwardenError, Result};
use crate::exec::running::RunningSet;
use crate::exec::runner::{ExitKind, ProcessRunner};
use crate::notify::Notifier;
use crate::state::StatusBook;
use crate::types::{BoxFuture, Severity, WorkflowStatus};
use crate::workflow::{WorkflowDefinition, WorkflowRegistry};

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Schedule,
    /// Automatic retry following the `failures`-th consecutive failure.
    Retry { failures: u32 },
    /// Operator request; resets the consecutive-failure counter.
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Schedule => f.write_str("schedule"),
            TriggerReason::Retry { failures } => write!(f, "retry after {failures} failure(s)"),
            TriggerReason::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    /// Failed; `retry_in` is set when an automatic retry was scheduled.
    Failed {
        failures: u32,
        retry_in: Option<Duration>,
    },
    /// Failed and the consecutive-failure counter reached `max_retries`.
    RetriesExhausted { failures: u32 },
    /// Another run of the same workflow was in flight; nothing happened.
    AlreadyRunning,
    /// Interrupted by shutdown. Does not count as a failed attempt.
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Schedule delayed retries after a failure. One-shot CLI triggers turn
    /// this off because the process exits right after the run.
    pub schedule_retries: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            schedule_retries: true,
        }
    }
}

/// Cheap to clone; clones share the same running set, state and tasks.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

struct Inner {
    registry: WorkflowRegistry,
    runner: Arc<dyn ProcessRunner>,
    book: Arc<StatusBook>,
    notifier: Notifier,
    running: RunningSet,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    options: ExecutorOptions,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("workflows", &self.inner.registry.len())
            .field("running", &self.inner.running.ids())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Executor {
    pub fn new(
        registry: WorkflowRegistry,
        runner: Arc<dyn ProcessRunner>,
        book: Arc<StatusBook>,
        notifier: Notifier,
    ) -> Self {
        Self::with_options(
            registry,
            runner,
            book,
            notifier,
            RunningSet::new(),
            CancellationToken::new(),
            TaskTracker::new(),
            ExecutorOptions::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_options(
        registry: WorkflowRegistry,
        runner: Arc<dyn ProcessRunner>,
        book: Arc<StatusBook>,
        notifier: Notifier,
        running: RunningSet,
        shutdown: CancellationToken,
        tracker: TaskTracker,
        options: ExecutorOptions,
    ) -> Self {
        book.register_workflows(registry.ids());
        Self {
            inner: Arc::new(Inner {
                registry,
                runner,
                book,
                notifier,
                running,
                shutdown,
                tracker,
                options,
            }),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    pub fn running(&self) -> &RunningSet {
        &self.inner.running
    }

    pub fn book(&self) -> &Arc<StatusBook> {
        &self.inner.book
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    /// Operator-initiated run: reset the failure counter, then run once.
    pub async fn trigger(&self, id: &str) -> Result<RunOutcome> {
        self.run(id, TriggerReason::Manual).await
    }

    /// Run workflow `id` once.
    ///
    /// Only an unknown id is an error, and it is reported before any state
    /// is touched. Every other failure mode is a [`RunOutcome`].
    pub async fn run(&self, id: &str, reason: TriggerReason) -> Result<RunOutcome> {
        let def = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| JobwardenError::WorkflowNotFound(id.to_string()))?;

        let Some(_guard) = self.inner.running.try_acquire(id) else {
            info!(workflow = %id, %reason, "workflow already running; skipping trigger");
            return Ok(RunOutcome::AlreadyRunning);
        };

        if self.inner.shutdown.is_cancelled() {
            debug!(workflow = %id, "shutdown in progress; not starting run");
            return Ok(RunOutcome::Cancelled);
        }

        info!(workflow = %id, name = %def.name, %reason, "starting workflow run");
        self.inner.book.update_workflow(id, |rec| {
            if reason == TriggerReason::Manual {
                rec.failure_count = 0;
            }
            rec.status = WorkflowStatus::Running;
            rec.last_run = Some(Utc::now());
        });

        let output = self
            .inner
            .runner
            .run(def.command_spec(), self.inner.shutdown.child_token())
            .await;

        match output.exit {
            ExitKind::Exited(0) => Ok(self.record_success(&def).await),
            ExitKind::Cancelled => {
                warn!(workflow = %id, "workflow run cancelled by shutdown");
                self.inner
                    .book
                    .update_workflow(id, |rec| rec.status = WorkflowStatus::Failed);
                Ok(RunOutcome::Cancelled)
            }
            _ => Ok(self.record_failure(&def, &output.describe()).await),
        }
    }

    async fn record_success(&self, def: &WorkflowDefinition) -> RunOutcome {
        self.inner.book.update_workflow(&def.id, |rec| {
            rec.status = WorkflowStatus::Success;
            rec.failure_count = 0;
        });
        self.inner
            .notifier
            .notify(
                &format!("{} completed successfully", def.name),
                Severity::Success,
            )
            .await;
        RunOutcome::Succeeded
    }

    async fn record_failure(&self, def: &WorkflowDefinition, reason: &str) -> RunOutcome {
        let failures = self.inner.book.update_workflow(&def.id, |rec| {
            rec.status = WorkflowStatus::Failed;
            rec.failure_count = rec.failure_count.saturating_add(1);
            rec.failure_count
        });

        warn!(
            workflow = %def.id,
            failures,
            max_retries = def.max_retries,
            reason,
            "workflow run failed"
        );

        if failures >= def.max_retries {
            self.inner
                .notifier
                .notify(
                    &format!(
                        "{} exceeded retry limit after {failures} attempts: {reason}",
                        def.name
                    ),
                    Severity::Error,
                )
                .await;
            return RunOutcome::RetriesExhausted { failures };
        }

        if !self.inner.options.schedule_retries {
            return RunOutcome::Failed {
                failures,
                retry_in: None,
            };
        }

        let delay = def.retry.delay_for(failures);
        info!(
            workflow = %def.id,
            delay_ms = delay.as_millis() as u64,
            "scheduling retry"
        );
        self.schedule_retry(def.id.clone(), delay, failures);
        RunOutcome::Failed {
            failures,
            retry_in: Some(delay),
        }
    }

    /// Fire-and-forget delayed retry, tracked so shutdown can wait for it.
    fn schedule_retry(&self, id: String, delay: Duration, failures: u32) {
        let this = self.clone();
        let cancel = self.inner.shutdown.clone();
        let task: BoxFuture<'static, ()> = Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(workflow = %id, "retry dropped by shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = this.run(&id, TriggerReason::Retry { failures }).await {
                        warn!(workflow = %id, error = %e, "retry failed to start");
                    }
                }
            }
        });
        self.inner.tracker.spawn(task);
    }
}
