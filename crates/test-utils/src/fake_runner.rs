use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobwarden::exec::{CommandSpec, ExitKind, ProcessOutput, ProcessRunner};
use jobwarden::types::BoxFuture;
use tokio_util::sync::CancellationToken;

/// A fake process runner that:
/// - records every spec it was asked to run
/// - returns scripted exit kinds in order, then a default
/// - optionally "runs" for a fixed delay, honouring cancellation.
#[derive(Clone)]
pub struct FakeProcessRunner {
    script: Arc<Mutex<VecDeque<ExitKind>>>,
    default: ExitKind,
    delay: Duration,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl FakeProcessRunner {
    /// Every run succeeds immediately.
    pub fn succeeding() -> Self {
        Self::with_default(ExitKind::Exited(0))
    }

    /// Every run exits with `code`.
    pub fn failing(code: i32) -> Self {
        Self::with_default(ExitKind::Exited(code))
    }

    pub fn with_default(default: ExitKind) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Outcomes handed out before falling back to the default.
    pub fn then(self, outcomes: impl IntoIterator<Item = ExitKind>) -> Self {
        self.script.lock().unwrap().extend(outcomes);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Labels of every run, in order.
    pub fn labels(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.label.clone())
            .collect()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, spec: CommandSpec, cancel: CancellationToken) -> BoxFuture<'_, ProcessOutput> {
        self.calls.lock().unwrap().push(spec);
        let exit = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        let delay = self.delay;

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return ProcessOutput::new(ExitKind::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            let mut out = ProcessOutput::new(exit.clone());
            if exit != ExitKind::Exited(0) {
                out.stderr = format!("fake failure: {exit}\n");
            }
            out.elapsed = delay;
            out
        })
    }
}
