#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use jobwarden::config::{ActionConfig, ConfigFile, RawConfigFile, RuleConfig, WorkflowConfig};
use jobwarden::types::{BackoffStrategy, CooldownPolicy};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.daemon.state_dir = dir.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.daemon.working_dir = dir.into();
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.daemon.retry_delay = delay;
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.daemon.backoff = backoff;
        self
    }

    pub fn cooldown_policy(mut self, policy: CooldownPolicy) -> Self {
        self.config.healing.cooldown_policy = policy;
        self
    }

    pub fn thresholds(mut self, disk: f64, memory: f64) -> Self {
        self.config.monitor.disk_threshold = disk;
        self.config.monitor.memory_threshold = memory;
        self
    }

    pub fn without_monitor(mut self) -> Self {
        self.config.monitor.enabled = false;
        self
    }

    pub fn without_healing(mut self) -> Self {
        self.config.healing.enabled = false;
        self
    }

    pub fn with_workflow(mut self, id: &str, wf: WorkflowConfig) -> Self {
        self.config.workflow.insert(id.to_string(), wf);
        self
    }

    pub fn with_action(mut self, id: &str, command: &str, args: &[&str]) -> Self {
        self.config.action.insert(
            id.to_string(),
            ActionConfig {
                command: command.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: BTreeMap::new(),
                working_dir: None,
                timeout: Duration::from_secs(60),
            },
        );
        self
    }

    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.config.rule.push(rule);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkflowConfig`.
pub struct WorkflowConfigBuilder {
    wf: WorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            wf: WorkflowConfig {
                name: None,
                schedule: None,
                command: command.to_string(),
                args: vec![],
                env: BTreeMap::new(),
                working_dir: None,
                timeout: Duration::from_secs(30),
                max_retries: 3,
                enabled: true,
                retry_delay: None,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.wf.name = Some(name.to_string());
        self
    }

    pub fn schedule(mut self, expr: &str) -> Self {
        self.wf.schedule = Some(expr.to_string());
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.wf.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.wf.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.wf.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.wf.max_retries = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.wf.retry_delay = Some(delay);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.wf.enabled = false;
        self
    }

    pub fn build(self) -> WorkflowConfig {
        self.wf
    }
}

/// Builder for `[[rule]]` entries.
pub struct RuleConfigBuilder {
    rule: RuleConfig,
}

impl RuleConfigBuilder {
    pub fn new(id: &str, condition: &str, action: &str) -> Self {
        Self {
            rule: RuleConfig {
                id: id.to_string(),
                condition: condition.to_string(),
                action: action.to_string(),
                cooldown: Duration::from_secs(30 * 60),
                max_daily: 10,
                description: String::new(),
                severity: None,
            },
        }
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.rule.cooldown = cooldown;
        self
    }

    pub fn max_daily(mut self, n: u32) -> Self {
        self.rule.max_daily = n;
        self
    }

    pub fn severity(mut self, severity: u32) -> Self {
        self.rule.severity = Some(severity);
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.rule.description = description.to_string();
        self
    }

    pub fn build(self) -> RuleConfig {
        self.rule
    }
}
