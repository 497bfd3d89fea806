// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `jobwarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobwarden",
    version,
    about = "Schedule recurring jobs, watch host health and repair known faults.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `$JOBWARDEN_CONFIG`, else `Jobwarden.toml` in the current
    /// working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBWARDEN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the catalog, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Without a command the daemon runs until SIGINT/SIGTERM.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the persisted workflow status map.
    Status,

    /// Run one workflow once, without automatic retries.
    Trigger {
        /// Workflow id as declared in `[workflow.<id>]`.
        id: String,
    },

    /// Print every healing rule with its cooldown/cap state.
    Rules,

    /// Force one remediation attempt for a healing rule.
    Heal {
        /// Rule id as declared in `[[rule]]`.
        rule: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
