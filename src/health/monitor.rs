// src/health/monitor.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorSection;
use crate::exec::RunningSet;
use crate::health::probe::SystemProbe;
use crate::notify::Notifier;
use crate::state::{HealthSnapshot, StateStore};
use crate::types::Severity;

/// Periodic host sampler.
///
/// Each tick samples disk and memory usage plus the number of in-flight
/// workflows, raises a critical notification for every threshold breach and
/// always writes the sample to the health-status file.
pub struct HealthMonitor {
    probe: Arc<dyn SystemProbe>,
    running: RunningSet,
    notifier: Notifier,
    store: StateStore<HealthSnapshot>,
    disk_threshold: f64,
    memory_threshold: f64,
}

impl HealthMonitor {
    pub fn new(
        cfg: &MonitorSection,
        probe: Arc<dyn SystemProbe>,
        running: RunningSet,
        notifier: Notifier,
        store: StateStore<HealthSnapshot>,
    ) -> Self {
        Self {
            probe,
            running,
            notifier,
            store,
            disk_threshold: cfg.disk_threshold,
            memory_threshold: cfg.memory_threshold,
        }
    }

    /// One sample/compare/persist pass.
    pub async fn tick(&self) -> HealthSnapshot {
        let disk = sample("disk", self.probe.disk_usage().await);
        let memory = sample("memory", self.probe.memory_usage().await);
        let snapshot = HealthSnapshot {
            disk,
            memory,
            running_workflows: self.running.len(),
            timestamp: Some(Utc::now()),
        };

        debug!(
            disk = %format!("{disk:.1}"),
            memory = %format!("{memory:.1}"),
            running = snapshot.running_workflows,
            "health sample"
        );

        for (label, value, threshold) in [
            ("DISK", disk, self.disk_threshold),
            ("MEMORY", memory, self.memory_threshold),
        ] {
            if value >= threshold {
                self.notifier
                    .notify(&breach_message(label, value, threshold), Severity::Critical)
                    .await;
            }
        }

        if let Err(e) = self.store.save(&snapshot) {
            error!(path = %self.store.path().display(), error = %e, "failed to write health status");
        }

        snapshot
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "health monitor started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("health monitor stopped");
    }
}

/// `"DISK USAGE CRITICAL: 90% (threshold: 85%)"`. Sinks add the severity
/// prefix.
fn breach_message(label: &str, value: f64, threshold: f64) -> String {
    format!("{label} USAGE CRITICAL: {value:.0}% (threshold: {threshold:.0}%)")
}

fn sample(metric: &str, result: anyhow::Result<f64>) -> f64 {
    match result {
        Ok(v) if v.is_finite() => v,
        Ok(v) => {
            warn!(metric, value = v, "non-finite sample; using 0");
            0.0
        }
        Err(e) => {
            warn!(metric, error = %e, "failed to sample metric; using 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breach_message_rounds_percentages() {
        assert_eq!(
            breach_message("DISK", 90.4, 85.0),
            "DISK USAGE CRITICAL: 90% (threshold: 85%)"
        );
    }

    #[test]
    fn webhook_alert_carries_a_single_severity_prefix() {
        let body = crate::notify::webhook::render(
            &breach_message("MEMORY", 95.0, 90.0),
            Severity::Critical,
        );
        assert_eq!(
            body,
            "🚨 **Jobwarden**\n\nMEMORY USAGE CRITICAL: 95% (threshold: 90%)"
        );
        assert_eq!(body.matches('🚨').count(), 1);
    }
}
