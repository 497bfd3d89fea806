// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod healing;
pub mod health;
pub mod logging;
pub mod notify;
pub mod state;
pub mod types;
pub mod workflow;

use std::io::{self, Write};

use anyhow::{Result, bail};
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::config::duration::format_duration;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::engine::Daemon;
use crate::exec::RunOutcome;
use crate::healing::{Gate, RuleStatus, RuleVerdict};
use crate::state::StatusDocument;

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, then either prints the catalog
/// (`--dry-run`), runs one of the one-shot commands, or runs the daemon
/// until SIGINT/SIGTERM.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    debug!(path = %config_path.display(), "config loaded");

    if args.dry_run {
        print_dry_run(&cfg, &mut io::stdout().lock())?;
        return Ok(());
    }

    let daemon = Daemon::from_config(cfg)?;

    match args.command {
        None => daemon.run().await?,
        Some(Command::Status) => print_status(&daemon.status(), &mut io::stdout().lock())?,
        Some(Command::Rules) => print_rules(&daemon.rule_status(), &mut io::stdout().lock())?,
        Some(Command::Trigger { id }) => match daemon.trigger(&id).await? {
            RunOutcome::Succeeded => println!("{id}: success"),
            other => bail!("workflow '{id}' did not succeed: {}", describe_outcome(&other)),
        },
        Some(Command::Heal { rule }) => match daemon.heal(&rule).await? {
            RuleVerdict::Fixed => println!("{rule}: remediation succeeded"),
            other => bail!("rule '{rule}' was not remediated: {}", describe_verdict(&other)),
        },
    }

    Ok(())
}

fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Succeeded => "succeeded".to_string(),
        RunOutcome::Failed { failures, .. } => format!("failed ({failures} consecutive)"),
        RunOutcome::RetriesExhausted { failures } => {
            format!("failed, retry limit reached after {failures} attempts")
        }
        RunOutcome::AlreadyRunning => "already running".to_string(),
        RunOutcome::Cancelled => "cancelled".to_string(),
    }
}

fn describe_verdict(verdict: &RuleVerdict) -> String {
    match verdict {
        RuleVerdict::Skipped(gate) => gate.to_string(),
        RuleVerdict::UnknownAction => "its action is not configured".to_string(),
        RuleVerdict::Fixed => "fixed".to_string(),
        RuleVerdict::Failed(reason) => format!("action failed: {reason}"),
    }
}

/// `status` output: one line per workflow, then healing counters.
pub fn print_status(doc: &StatusDocument, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:<28} {:<11} {:>8}  LAST RUN", "WORKFLOW", "STATUS", "FAILURES")?;
    for (id, rec) in doc.workflows.iter() {
        let last = rec
            .last_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<28} {:<11} {:>8}  {last}",
            id,
            rec.status.to_string(),
            rec.failure_count
        )?;
    }
    if let Some(ts) = doc.last_update {
        writeln!(out, "\nlast update: {}", ts.to_rfc3339())?;
    }
    Ok(())
}

/// `rules` output.
pub fn print_rules(rules: &[RuleStatus], out: &mut impl Write) -> io::Result<()> {
    if rules.is_empty() {
        writeln!(out, "no healing rules configured")?;
        return Ok(());
    }
    for s in rules {
        let phase = match s.gate {
            Gate::Ready => "idle".to_string(),
            Gate::CoolingDown { until } => format!("cooling-down until {}", until.to_rfc3339()),
            Gate::CapReached { resets_at } => format!("capped until {}", resets_at.to_rfc3339()),
        };
        let last = s
            .counters
            .last_invocation
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        writeln!(out, "{} (severity {})", s.rule.id, s.rule.severity)?;
        writeln!(out, "    condition: {}", s.rule.condition)?;
        writeln!(out, "    action:    {}", s.rule.action)?;
        writeln!(out, "    phase:     {phase}")?;
        writeln!(
            out,
            "    count:     {}/{} today, last {last}",
            s.counters.invocation_count, s.rule.max_daily
        )?;
    }
    Ok(())
}

/// Simple dry-run output: print workflows, actions and rules.
pub fn print_dry_run(cfg: &ConfigFile, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "jobwarden dry-run")?;
    writeln!(out, "  daemon.timezone = {}", cfg.daemon.timezone)?;
    writeln!(out, "  daemon.state_dir = {}", cfg.daemon.state_dir.display())?;
    writeln!(
        out,
        "  daemon.retry_delay = {} ({:?})",
        format_duration(cfg.daemon.retry_delay),
        cfg.daemon.backoff
    )?;
    writeln!(out)?;

    writeln!(out, "workflows ({}):", cfg.workflow.len())?;
    for (id, wf) in cfg.workflow.iter() {
        writeln!(out, "  - {id} ({})", wf.display_name(id))?;
        writeln!(out, "      command: {} {}", wf.command, wf.args.join(" "))?;
        match wf.schedule.as_deref() {
            Some(s) if !s.trim().is_empty() => writeln!(out, "      schedule: {s}")?,
            _ => writeln!(out, "      schedule: (manual only)")?,
        }
        writeln!(
            out,
            "      timeout: {}, max_retries: {}",
            format_duration(wf.timeout),
            wf.max_retries
        )?;
        if !wf.enabled {
            writeln!(out, "      enabled: false")?;
        }
    }

    writeln!(out)?;
    writeln!(out, "actions ({}):", cfg.action.len())?;
    for (id, action) in cfg.action.iter() {
        writeln!(out, "  - {id}: {} {}", action.command, action.args.join(" "))?;
    }

    writeln!(out)?;
    writeln!(out, "rules ({}):", cfg.rules.len())?;
    for rule in cfg.rules.iter() {
        writeln!(
            out,
            "  - {} [{}] when {} -> {} (cooldown {}, max {}/day)",
            rule.id,
            rule.severity,
            rule.condition,
            rule.action,
            format_duration(rule.cooldown),
            rule.max_daily
        )?;
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
