// src/engine/scheduler.rs

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::JobwardenError;
use crate::exec::{Executor, TriggerReason};
use crate::workflow::{CronSchedule, WorkflowDefinition};

/// Binds every schedulable workflow to its own timer loop.
///
/// Each loop sleeps until the next fire time and then hands the run to the
/// executor's task tracker, so a long-running workflow never delays the
/// next tick of any workflow (including itself; the executor's running gate
/// drops overlapping ticks).
#[derive(Debug)]
pub struct Scheduler {
    executor: Executor,
    tz: Tz,
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(executor: Executor, tz: Tz, cancel: CancellationToken) -> Self {
        Self {
            executor,
            tz,
            cancel,
            loops: Vec::new(),
        }
    }

    /// Parse every schedule and start the timer loops.
    ///
    /// A workflow whose expression does not parse is logged and skipped.
    /// Returns the number of workflows that were scheduled.
    pub fn start(&mut self) -> usize {
        let defs: Vec<Arc<WorkflowDefinition>> =
            self.executor.registry().schedulable().cloned().collect();

        for def in defs {
            let Some(expr) = def.schedule.as_deref() else {
                continue;
            };
            let schedule = match CronSchedule::parse(expr, self.tz) {
                Ok(s) => s,
                Err(reason) => {
                    let err = JobwardenError::InvalidSchedule {
                        workflow: def.id.clone(),
                        reason,
                    };
                    error!(error = %err, "workflow will not be scheduled");
                    continue;
                }
            };

            info!(
                workflow = %def.id,
                schedule = %schedule.expression(),
                next = ?schedule.next_after(Utc::now()),
                "workflow scheduled"
            );

            let handle = tokio::spawn(tick_loop(
                self.executor.clone(),
                def.id.clone(),
                schedule,
                self.cancel.clone(),
            ));
            self.loops.push(handle);
        }

        self.loops.len()
    }

    /// Cancel all pending ticks and wait for the loops to exit.
    ///
    /// Runs already handed to the executor are not awaited here.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for handle in self.loops.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
        }
        debug!("scheduler stopped");
    }

    pub fn scheduled_count(&self) -> usize {
        self.loops.len()
    }
}

async fn tick_loop(
    executor: Executor,
    id: String,
    schedule: CronSchedule,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(workflow = %id, "schedule has no future fire times; stopping its loop");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(workflow = %id, "scheduler loop cancelled");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        debug!(workflow = %id, "schedule tick");
        let exec = executor.clone();
        let run_id = id.clone();
        executor.tracker().spawn(async move {
            if let Err(e) = exec.run(&run_id, TriggerReason::Schedule).await {
                warn!(workflow = %run_id, error = %e, "scheduled run failed to start");
            }
        });
    }
}
