// src/healing/diagnostics.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::exec::RunningSet;
use crate::health::{HttpProbe, SystemProbe};
use crate::healing::condition::{Metric, MetricValue};
use crate::state::StatusBook;
use crate::types::BoxFuture;

/// Point-in-time metric readings for one healing cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    values: BTreeMap<Metric, MetricValue>,
}

impl Diagnostics {
    pub fn get(&self, metric: Metric) -> Option<&MetricValue> {
        self.values.get(&metric)
    }

    pub fn insert(&mut self, metric: Metric, value: MetricValue) {
        self.values.insert(metric, value);
    }

    pub fn with(mut self, metric: Metric, value: MetricValue) -> Self {
        self.insert(metric, value);
        self
    }
}

/// Produces a [`Diagnostics`] snapshot. Must not fail: unavailable metrics
/// are either omitted or reported as a safe default.
pub trait DiagnosticsSource: Send + Sync {
    fn collect(&self) -> BoxFuture<'_, Diagnostics>;
}

/// Collects from the host, the optional service endpoints and the shared
/// workflow state.
pub struct HostDiagnostics {
    system: Arc<dyn SystemProbe>,
    backend: Option<HttpProbe>,
    orchestrator: Option<HttpProbe>,
    book: Arc<StatusBook>,
    running: RunningSet,
}

impl HostDiagnostics {
    pub fn new(
        system: Arc<dyn SystemProbe>,
        backend: Option<HttpProbe>,
        orchestrator: Option<HttpProbe>,
        book: Arc<StatusBook>,
        running: RunningSet,
    ) -> Self {
        Self {
            system,
            backend,
            orchestrator,
            book,
            running,
        }
    }
}

impl DiagnosticsSource for HostDiagnostics {
    fn collect(&self) -> BoxFuture<'_, Diagnostics> {
        Box::pin(async move {
            let mut d = Diagnostics::default();

            let disk = self.system.disk_usage().await.unwrap_or_else(|e| {
                warn!(error = %e, "disk usage unavailable; reporting 0");
                0.0
            });
            let memory = self.system.memory_usage().await.unwrap_or_else(|e| {
                warn!(error = %e, "memory usage unavailable; reporting 0");
                0.0
            });
            d.insert(Metric::DiskUsage, MetricValue::Number(disk));
            d.insert(Metric::MemoryUsage, MetricValue::Number(memory));

            // Unconfigured endpoints are left out so their rules never match.
            if let Some(probe) = &self.backend {
                d.insert(Metric::BackendStatus, up_down(probe.is_up().await));
            }
            if let Some(probe) = &self.orchestrator {
                d.insert(Metric::OrchestratorStatus, up_down(probe.is_up().await));
            }

            d.insert(
                Metric::WorkflowFailureRate,
                MetricValue::Number(f64::from(self.book.total_failures())),
            );
            d.insert(
                Metric::RunningWorkflows,
                MetricValue::Number(self.running.len() as f64),
            );

            d
        })
    }
}

fn up_down(up: bool) -> MetricValue {
    MetricValue::text(if up { "up" } else { "down" })
}
