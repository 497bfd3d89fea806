// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{JobwardenError, Result};

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "JOBWARDEN_CONFIG";

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] to get
/// a usable [`ConfigFile`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        JobwardenError::ConfigError(format!("reading config file {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses every healing rule condition into a typed `Condition`.
/// - Rejects configs that can never run (no workflows, zero timeouts,
///   unknown timezone, duplicate rule ids).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Parse and validate a config held in memory (used by tests and `--config -`
/// style tooling).
pub fn load_from_str(contents: &str) -> Result<ConfigFile> {
    let raw: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw)
}

/// Default config path: `$JOBWARDEN_CONFIG` if set, otherwise
/// `Jobwarden.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Jobwarden.toml"))
}
