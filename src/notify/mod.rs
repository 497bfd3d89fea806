// src/notify/mod.rs

//! Best-effort operator notifications.
//!
//! Every message is logged locally through `tracing` and then fanned out to
//! the configured [`NotificationSink`]s. Sink failures and timeouts are
//! logged and swallowed: a broken webhook must never fail a workflow run or
//! a healing cycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::NotificationSection;
use crate::types::{BoxFuture, Severity};

pub mod webhook;

pub use webhook::WebhookSink;

/// Environment variable consulted when `[notifications].webhook_url` is unset.
pub const WEBHOOK_ENV_VAR: &str = "JOBWARDEN_WEBHOOK";

/// Destination for operator messages.
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn send<'a>(
        &'a self,
        message: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

#[derive(Clone)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("Notifier")
            .field("sinks", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Notifier {
    /// A notifier that only logs.
    pub fn log_only() -> Self {
        Self {
            sinks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Build from `[notifications]`, picking up the webhook URL from the
    /// environment when the config leaves it unset.
    pub fn from_config(cfg: &NotificationSection) -> anyhow::Result<Self> {
        let notifier = Self::log_only().with_timeout(cfg.timeout);
        if !cfg.enabled {
            return Ok(notifier);
        }

        let url = cfg
            .webhook_url
            .clone()
            .or_else(|| std::env::var(WEBHOOK_ENV_VAR).ok())
            .filter(|u| !u.trim().is_empty());

        match url {
            Some(url) => Ok(notifier.with_sink(Arc::new(WebhookSink::new(url, cfg.timeout)?))),
            None => {
                info!("no webhook configured; notifications are logged only");
                Ok(notifier)
            }
        }
    }

    /// Deliver `message` everywhere. Never fails.
    pub async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(%severity, "{message}"),
            Severity::Error => warn!(%severity, "{message}"),
            Severity::Critical => error!(%severity, "{message}"),
        }

        for sink in &self.sinks {
            match tokio::time::timeout(self.timeout, sink.send(message, severity)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(sink = sink.name(), error = %e, "notification delivery failed")
                }
                Err(_) => warn!(
                    sink = sink.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "notification delivery timed out"
                ),
            }
        }
    }
}
