// src/config/mod.rs

//! Configuration loading and validation for jobwarden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse human-friendly duration strings (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants and parse rule conditions (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ActionConfig, ConfigFile, DaemonSection, HealingSection, MonitorSection,
    NotificationSection, RawConfigFile, RuleConfig, WorkflowConfig,
};
