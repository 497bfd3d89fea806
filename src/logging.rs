// src/logging.rs

//! Logging setup for `jobwarden` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `JOBWARDEN_LOG` environment variable, either a bare level ("debug") or
//!    a full directive list ("jobwarden=debug,reqwest=warn")
//! 3. default to `info` for jobwarden, `warn` for the HTTP stack
//!
//! Logs are sent to STDERR so that `status` / `rules` output on stdout stays
//! machine-readable.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "JOBWARDEN_LOG";

const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directives_for(lvl)),
        None => EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn directives_for(lvl: LogLevel) -> String {
    let level = match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };
    // The HTTP stack is only interesting when explicitly tracing.
    if matches!(lvl, LogLevel::Trace) {
        level.to_string()
    } else {
        format!("{level},hyper=warn,hyper_util=warn,reqwest=warn")
    }
}
