// src/exec/runner.rs

//! External process execution.
//!
//! `ProcessRunner` is the seam between the executor / healing actions and
//! the OS. [`RealProcessRunner`] spawns with `tokio::process`, streams each
//! output line into the log, keeps a bounded tail of stdout/stderr, and
//! enforces the hard timeout: SIGTERM first, SIGKILL once the grace period
//! runs out. Tests substitute a fake runner that never spawns anything.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::BoxFuture;

/// Bytes of stdout/stderr kept per stream; older lines are dropped first.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// How long to wait for the output readers after the child has exited.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Everything needed to spawn one process.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Workflow or action id, used for log fields.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    /// Overrides applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// How a process run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited on its own. `-1` when killed by a signal we did not send.
    Exited(i32),
    TimedOut,
    Cancelled,
    SpawnFailed(String),
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: ExitKind,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn new(exit: ExitKind) -> Self {
        Self {
            exit,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn success(&self) -> bool {
        self.exit == ExitKind::Exited(0)
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn last_output_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find_map(|s| s.lines().rev().map(str::trim).find(|l| !l.is_empty()))
    }

    /// One-line failure description suitable for notifications.
    pub fn describe(&self) -> String {
        let base = self.exit.to_string();
        match self.last_output_line() {
            Some(line) if !self.success() => format!("{base}: {line}"),
            _ => base,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Exited(0) => f.write_str("exited successfully"),
            ExitKind::Exited(code) => write!(f, "exited with code {code}"),
            ExitKind::TimedOut => f.write_str("timed out"),
            ExitKind::Cancelled => f.write_str("cancelled"),
            ExitKind::SpawnFailed(e) => write!(f, "failed to start: {e}"),
        }
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion, its timeout, or `cancel`.
    ///
    /// Never errors: every failure mode is an [`ExitKind`].
    fn run(&self, spec: CommandSpec, cancel: CancellationToken) -> BoxFuture<'_, ProcessOutput>;
}

#[derive(Debug, Clone)]
pub struct RealProcessRunner {
    /// Time between SIGTERM and SIGKILL.
    grace: Duration,
}

impl RealProcessRunner {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for RealProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl ProcessRunner for RealProcessRunner {
    fn run(&self, spec: CommandSpec, cancel: CancellationToken) -> BoxFuture<'_, ProcessOutput> {
        Box::pin(run_process(spec, cancel, self.grace))
    }
}

async fn run_process(spec: CommandSpec, cancel: CancellationToken, grace: Duration) -> ProcessOutput {
    let started = Instant::now();
    info!(
        label = %spec.label,
        program = %spec.program,
        args = ?spec.args,
        timeout_ms = spec.timeout.as_millis() as u64,
        "starting process"
    );

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(label = %spec.label, program = %spec.program, error = %e, "failed to spawn process");
            let mut out = ProcessOutput::new(ExitKind::SpawnFailed(e.to_string()));
            out.elapsed = started.elapsed();
            return out;
        }
    };

    let stdout = child
        .stdout
        .take()
        .map(|s| tokio::spawn(capture_lines(spec.label.clone(), "stdout", s)));
    let stderr = child
        .stderr
        .take()
        .map(|s| tokio::spawn(capture_lines(spec.label.clone(), "stderr", s)));

    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitKind::Exited(status.code().unwrap_or(-1)),
            Err(e) => ExitKind::SpawnFailed(format!("waiting for process: {e}")),
        },
        _ = tokio::time::sleep(spec.timeout) => {
            warn!(label = %spec.label, timeout_ms = spec.timeout.as_millis() as u64, "process timed out; terminating");
            terminate(&mut child, grace, &spec.label).await;
            ExitKind::TimedOut
        }
        _ = cancel.cancelled() => {
            info!(label = %spec.label, "cancellation requested; terminating process");
            terminate(&mut child, grace, &spec.label).await;
            ExitKind::Cancelled
        }
    };

    let output = ProcessOutput {
        exit,
        stdout: drain(stdout).await,
        stderr: drain(stderr).await,
        elapsed: started.elapsed(),
    };

    info!(
        label = %spec.label,
        outcome = %output.exit,
        elapsed_ms = output.elapsed.as_millis() as u64,
        "process finished"
    );
    output
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration, label: &str) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            debug!(label, "process ignored SIGTERM; killing");
        }
    }

    if let Err(e) = child.kill().await {
        warn!(label, error = %e, "failed to kill process");
    }
}

async fn capture_lines<R>(label: String, stream: &'static str, reader: R) -> String
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        info!(label = %label, stream, "{line}");
        captured.push_str(&line);
        captured.push('\n');
        if captured.len() > CAPTURE_LIMIT {
            let cut = captured.len() - CAPTURE_LIMIT;
            let cut = (cut..captured.len())
                .find(|&i| captured.is_char_boundary(i))
                .unwrap_or(captured.len());
            captured.drain(..cut);
        }
    }

    captured
}

/// Collect a reader task's output. A grandchild holding the pipe open must
/// not stall the run, so the wait is bounded.
async fn drain(handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match tokio::time::timeout(READER_DRAIN, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_last_stderr_line() {
        let out = ProcessOutput {
            exit: ExitKind::Exited(2),
            stdout: "progress\n".into(),
            stderr: "warning\nfatal: disk full\n\n".into(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(out.describe(), "exited with code 2: fatal: disk full");
        assert!(!out.success());
    }

    #[test]
    fn success_has_no_suffix() {
        let mut out = ProcessOutput::new(ExitKind::Exited(0));
        out.stdout = "done".into();
        assert!(out.success());
        assert_eq!(out.describe(), "exited successfully");
    }
}
