// src/engine/daemon.rs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::ConfigFile;
use crate::engine::scheduler::Scheduler;
use crate::errors::{JobwardenError, Result};
use crate::exec::{
    Executor, ExecutorOptions, ProcessRunner, RealProcessRunner, RunOutcome, RunningSet,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::healing::{ActionRegistry, HealingEngine, HostDiagnostics, RuleStatus, RuleVerdict};
use crate::health::{HealthMonitor, HostProbe, HttpProbe, SystemProbe};
use crate::notify::Notifier;
use crate::state::{StateStore, StatusBook, StatusDocument};
use crate::types::Severity;
use crate::workflow::WorkflowRegistry;

/// Extra time allowed on top of `shutdown_grace` for in-flight runs to
/// record their outcome.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(5);

/// Long-running orchestrator: owns the shared state and every loop.
///
/// The one-shot CLI commands reuse the same wiring so they see exactly the
/// state, actions and processes the daemon would.
pub struct Daemon {
    cfg: ConfigFile,
    runner: Arc<dyn ProcessRunner>,
    probe: Arc<dyn SystemProbe>,
    notifier: Notifier,
    fs: Arc<dyn FileSystem>,
}

impl Daemon {
    /// Production wiring: real processes, host probes, webhook notifier.
    pub fn from_config(cfg: ConfigFile) -> Result<Self> {
        let notifier = Notifier::from_config(&cfg.notifications)?;
        Ok(Self {
            runner: Arc::new(RealProcessRunner::new(cfg.daemon.shutdown_grace)),
            probe: Arc::new(HostProbe::new(cfg.monitor.disk_path.clone())),
            notifier,
            fs: Arc::new(RealFileSystem),
            cfg,
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ConfigFile {
        &self.cfg
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Run until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then stop everything and flush state.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let tz = self.timezone()?;
        let book = self.open_book();
        book.recover_stale();
        let root = CancellationToken::new();
        let tracker = TaskTracker::new();
        let running = RunningSet::new();

        let executor = self.executor(
            book.clone(),
            running.clone(),
            root.clone(),
            tracker.clone(),
            ExecutorOptions::default(),
        );
        if let Err(e) = book.flush() {
            error!(error = %e, "initial state write failed; continuing with in-memory state");
        }

        if self.cfg.monitor.enabled {
            let monitor = HealthMonitor::new(
                &self.cfg.monitor,
                self.probe.clone(),
                running.clone(),
                self.notifier.clone(),
                StateStore::with_fs(self.cfg.health_path(), self.fs.clone()),
            );
            // The interval's first tick fires immediately: that is the
            // startup health check.
            tracker.spawn(monitor.run(self.cfg.monitor.interval, root.child_token()));
        }

        if self.cfg.healing.enabled {
            let engine = self.healing_engine(book.clone(), running.clone(), root.clone())?;
            tracker.spawn(engine.run(self.cfg.healing.interval, root.child_token()));
        }

        let mut scheduler = Scheduler::new(executor, tz, root.child_token());
        let scheduled = scheduler.start();
        info!(
            workflows = self.cfg.workflow.len(),
            scheduled,
            rules = self.cfg.rules.len(),
            timezone = %tz,
            "jobwarden daemon started"
        );
        self.notifier
            .notify(
                &format!("Jobwarden started: {scheduled} workflow(s) scheduled"),
                Severity::Info,
            )
            .await;

        shutdown.await;
        info!("shutdown requested");

        root.cancel();
        scheduler.stop().await;
        tracker.close();
        let budget = self.cfg.daemon.shutdown_grace + SHUTDOWN_SLACK;
        if tokio::time::timeout(budget, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                "in-flight tasks did not finish within the shutdown budget"
            );
        }

        book.flush()?;
        info!("state flushed; exiting");
        Ok(())
    }

    /// Run workflow `id` once with the failure counter reset and no
    /// automatic retry. Backs the `trigger` command.
    pub async fn trigger(&self, id: &str) -> Result<RunOutcome> {
        let book = self.open_book();
        let executor = self.executor(
            book,
            RunningSet::new(),
            CancellationToken::new(),
            TaskTracker::new(),
            ExecutorOptions {
                schedule_retries: false,
            },
        );
        executor.trigger(id).await
    }

    /// Force one remediation attempt for `rule_id`. Backs the `heal` command.
    pub async fn heal(&self, rule_id: &str) -> Result<RuleVerdict> {
        let engine = self.healing_engine(
            self.open_book(),
            RunningSet::new(),
            CancellationToken::new(),
        )?;
        engine.force(rule_id).await
    }

    /// Persisted workflow/healing state, with every configured workflow
    /// present.
    pub fn status(&self) -> StatusDocument {
        let book = self.open_book();
        book.register_workflows(self.cfg.workflow.keys().map(String::as_str));
        book.snapshot()
    }

    /// Every rule with its counters and gate as of now.
    pub fn rule_status(&self) -> Vec<RuleStatus> {
        let book = self.open_book();
        self.cfg
            .rules
            .iter()
            .map(|rule| {
                let counters = book.rule_counters(&rule.id);
                let gate = rule.gate(&counters, Utc::now());
                RuleStatus {
                    rule: rule.clone(),
                    counters,
                    gate,
                }
            })
            .collect()
    }

    fn timezone(&self) -> Result<Tz> {
        self.cfg.daemon.timezone.parse().map_err(|_| {
            JobwardenError::ConfigError(format!("unknown timezone '{}'", self.cfg.daemon.timezone))
        })
    }

    fn open_book(&self) -> Arc<StatusBook> {
        Arc::new(StatusBook::open(StateStore::with_fs(
            self.cfg.status_path(),
            self.fs.clone(),
        )))
    }

    fn executor(
        &self,
        book: Arc<StatusBook>,
        running: RunningSet,
        cancel: CancellationToken,
        tracker: TaskTracker,
        options: ExecutorOptions,
    ) -> Executor {
        Executor::with_options(
            WorkflowRegistry::from_config(&self.cfg),
            self.runner.clone(),
            book,
            self.notifier.clone(),
            running,
            cancel,
            tracker,
            options,
        )
    }

    fn healing_engine(
        &self,
        book: Arc<StatusBook>,
        running: RunningSet,
        cancel: CancellationToken,
    ) -> Result<HealingEngine> {
        let h = &self.cfg.healing;
        let backend = h
            .backend_url
            .as_deref()
            .map(|url| HttpProbe::new(url, h.probe_timeout))
            .transpose()?;
        let orchestrator = h
            .orchestrator_url
            .as_deref()
            .map(|url| HttpProbe::new(url, h.probe_timeout))
            .transpose()?;

        let source = HostDiagnostics::new(
            self.probe.clone(),
            backend,
            orchestrator,
            book.clone(),
            running,
        );
        Ok(HealingEngine::new(
            self.cfg.rules.clone(),
            ActionRegistry::from_config(&self.cfg, self.runner.clone()),
            Arc::new(source),
            book,
            self.notifier.clone(),
        )
        .with_policy(h.cooldown_policy)
        .with_cancel(cancel))
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = term => {}
    }
}
