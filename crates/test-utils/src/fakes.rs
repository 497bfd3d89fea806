use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use jobwarden::errors::{JobwardenError, Result};
use jobwarden::healing::{Diagnostics, DiagnosticsSource, RemediationAction};
use jobwarden::health::SystemProbe;
use jobwarden::notify::{NotificationSink, Notifier};
use jobwarden::types::{BoxFuture, Severity};
use tokio_util::sync::CancellationToken;

/// Notification sink that keeps every message it receives.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(String, Severity)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<(String, Severity)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(_, s)| *s == severity)
            .map(|(m, _)| m)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn send<'a>(&'a self, message: &'a str, severity: Severity) -> BoxFuture<'a, anyhow::Result<()>> {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
        Box::pin(async { Ok(()) })
    }
}

/// A `Notifier` wired to a fresh `RecordingSink`.
pub fn recording_notifier() -> (Notifier, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (Notifier::log_only().with_sink(sink.clone()), sink)
}

/// System probe returning fixed readings; `None` simulates a sampling error.
pub struct FixedProbe {
    pub disk: Option<f64>,
    pub memory: Option<f64>,
}

impl FixedProbe {
    pub fn new(disk: f64, memory: f64) -> Self {
        Self {
            disk: Some(disk),
            memory: Some(memory),
        }
    }
}

impl SystemProbe for FixedProbe {
    fn disk_usage(&self) -> BoxFuture<'_, anyhow::Result<f64>> {
        let v = self.disk;
        Box::pin(async move { v.ok_or_else(|| anyhow!("disk probe unavailable")) })
    }

    fn memory_usage(&self) -> BoxFuture<'_, anyhow::Result<f64>> {
        let v = self.memory;
        Box::pin(async move { v.ok_or_else(|| anyhow!("memory probe unavailable")) })
    }
}

/// Diagnostics source returning a fixed snapshot.
pub struct FixedDiagnostics(pub Diagnostics);

impl DiagnosticsSource for FixedDiagnostics {
    fn collect(&self) -> BoxFuture<'_, Diagnostics> {
        let d = self.0.clone();
        Box::pin(async move { d })
    }
}

/// Remediation action that records its invocations into a shared log.
pub struct ScriptedAction {
    name: String,
    succeed: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAction {
    pub fn new(name: &str, succeed: bool, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            succeed,
            log,
        }
    }
}

impl RemediationAction for ScriptedAction {
    fn execute(&self, _cancel: CancellationToken) -> BoxFuture<'_, Result<()>> {
        self.log.lock().unwrap().push(self.name.clone());
        let result = if self.succeed {
            Ok(())
        } else {
            Err(JobwardenError::RemediationFailed(format!("{} exited with code 1", self.name)))
        };
        Box::pin(async move { result })
    }
}
