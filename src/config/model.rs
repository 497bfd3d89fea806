// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration;
use crate::healing::HealingRule;
use crate::types::{BackoffStrategy, CooldownPolicy};

/// Configuration exactly as read from the TOML file, before validation.
///
/// ```toml
/// [daemon]
/// timezone = "Australia/Sydney"
/// retry_delay = "60s"
///
/// [workflow.blog-generator]
/// name = "Blog generator"
/// schedule = "0 6 * * *"
/// command = "node"
/// args = ["scripts/generate-blog.js"]
/// timeout = "30m"
/// max_retries = 3
///
/// [action.cleanup_disk]
/// command = "sh"
/// args = ["-c", "find /tmp -type f -atime +7 -delete"]
///
/// [[rule]]
/// id = "high-disk-usage"
/// condition = "disk_usage > 85"
/// action = "cleanup_disk"
/// cooldown = "30m"
/// max_daily = 5
/// ```
///
/// Rules are an array of tables so that their declaration order survives
/// deserialization; it breaks severity ties during a healing cycle.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub healing: HealingSection,

    #[serde(default)]
    pub notifications: NotificationSection,

    /// All workflows from `[workflow.<id>]`, keyed by id.
    #[serde(default)]
    pub workflow: BTreeMap<String, WorkflowConfig>,

    /// Remediation actions from `[action.<id>]`, keyed by action id.
    #[serde(default)]
    pub action: BTreeMap<String, ActionConfig>,

    /// Healing rules from `[[rule]]`, in declaration order.
    #[serde(default)]
    pub rule: Vec<RuleConfig>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`), so
/// holders can rely on rule conditions being parsed and durations sane.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub daemon: DaemonSection,
    pub monitor: MonitorSection,
    pub healing: HealingSection,
    pub notifications: NotificationSection,
    pub workflow: BTreeMap<String, WorkflowConfig>,
    pub action: BTreeMap<String, ActionConfig>,
    /// Healing rules with their conditions parsed, in declaration order.
    pub rules: Vec<HealingRule>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, rules: Vec<HealingRule>) -> Self {
        Self {
            daemon: raw.daemon,
            monitor: raw.monitor,
            healing: raw.healing,
            notifications: raw.notifications,
            workflow: raw.workflow,
            action: raw.action,
            rules,
        }
    }

    /// Path of the workflow/healing status document.
    pub fn status_path(&self) -> PathBuf {
        self.daemon.state_dir.join(STATUS_FILE_NAME)
    }

    /// Path of the health snapshot document.
    pub fn health_path(&self) -> PathBuf {
        self.daemon.state_dir.join(HEALTH_FILE_NAME)
    }
}

pub const STATUS_FILE_NAME: &str = "active-workflows.json";
pub const HEALTH_FILE_NAME: &str = "health-status.json";

/// `[daemon]` section: process-wide execution defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSection {
    /// Directory holding the persisted status documents.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Default working directory for spawned commands.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// IANA timezone used to evaluate schedule expressions.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Delay before an automatic retry of a failed workflow.
    #[serde(default = "default_retry_delay", with = "duration")]
    pub retry_delay: Duration,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Upper bound for exponential backoff.
    #[serde(default = "default_max_retry_delay", with = "duration")]
    pub max_retry_delay: Duration,

    /// How long a terminated process gets between SIGTERM and SIGKILL.
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub shutdown_grace: Duration,

    /// Environment applied to every spawned command, below per-workflow
    /// overrides and above the inherited process environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".jobwarden/state")
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(10)
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            working_dir: default_working_dir(),
            timezone: default_timezone(),
            retry_delay: default_retry_delay(),
            backoff: BackoffStrategy::default(),
            max_retry_delay: default_max_retry_delay(),
            shutdown_grace: default_shutdown_grace(),
            env: BTreeMap::new(),
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_monitor_interval", with = "duration")]
    pub interval: Duration,

    /// Disk usage percentage at or above which a critical alert is raised.
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold: f64,

    /// Memory usage percentage at or above which a critical alert is raised.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,

    /// Mount point whose usage is sampled.
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_disk_threshold() -> f64 {
    85.0
}

fn default_memory_threshold() -> f64 {
    90.0
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("/")
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_monitor_interval(),
            disk_threshold: default_disk_threshold(),
            memory_threshold: default_memory_threshold(),
            disk_path: default_disk_path(),
        }
    }
}

/// `[healing]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HealingSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_healing_interval", with = "duration")]
    pub interval: Duration,

    #[serde(default)]
    pub cooldown_policy: CooldownPolicy,

    /// Health endpoint of the backend service; unset means the
    /// `backend_status` metric is never reported.
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Health endpoint of the orchestrator service.
    #[serde(default)]
    pub orchestrator_url: Option<String>,

    #[serde(default = "default_probe_timeout", with = "duration")]
    pub probe_timeout: Duration,
}

fn default_healing_interval() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for HealingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_healing_interval(),
            cooldown_policy: CooldownPolicy::default(),
            backend_url: None,
            orchestrator_url: None,
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// `[notifications]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chat webhook receiving `{"content": "..."}` payloads. Falls back to
    /// the `JOBWARDEN_WEBHOOK` environment variable.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_notify_timeout", with = "duration")]
    pub timeout: Duration,
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            timeout: default_notify_timeout(),
        }
    }
}

/// `[workflow.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Display name used in notifications; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,

    /// Cron expression. Workflows without one can only be triggered manually.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Executable to spawn (resolved through `PATH`).
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides merged over `[daemon].env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_workflow_timeout", with = "duration")]
    pub timeout: Duration,

    /// Consecutive failed attempts after which automatic retries stop.
    #[serde(default = "default_max_retries", alias = "retries")]
    pub max_retries: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-workflow override of `[daemon].retry_delay`.
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub retry_delay: Option<Duration>,
}

fn default_workflow_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_retries() -> u32 {
    3
}

/// `[action.<id>]` section: one bounded remediation command.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default = "default_action_timeout", with = "duration")]
    pub timeout: Duration,
}

fn default_action_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

/// `[[rule]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub id: String,

    /// `"<metric> <op> <threshold>"`, e.g. `"disk_usage > 85"` or
    /// `"backend_status = down"`.
    pub condition: String,

    /// Key into `[action.<id>]`.
    pub action: String,

    #[serde(default = "default_cooldown", with = "duration")]
    pub cooldown: Duration,

    /// Maximum remediation attempts per rolling 24h window.
    #[serde(default = "default_max_daily")]
    pub max_daily: u32,

    #[serde(default)]
    pub description: String,

    /// Explicit severity; defaults from the condition's metric.
    #[serde(default)]
    pub severity: Option<u32>,
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_daily() -> u32 {
    10
}

impl WorkflowConfig {
    /// Display name, falling back to the workflow id.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(id)
    }
}
