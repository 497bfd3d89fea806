// src/healing/actions.rs

//! Remediation actions, resolved by id from healing rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{ActionConfig, ConfigFile};
use crate::errors::{JobwardenError, Result};
use crate::exec::{CommandSpec, ProcessRunner};
use crate::types::BoxFuture;

/// One bounded repair step.
pub trait RemediationAction: Send + Sync {
    fn execute(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<()>>;
}

/// Runs a configured command through the shared [`ProcessRunner`], so
/// remediation gets the same timeout and termination handling as workflows.
pub struct CommandAction {
    spec: CommandSpec,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandAction {
    pub fn new(spec: CommandSpec, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { spec, runner }
    }

    pub fn from_config(
        id: &str,
        cfg: &ActionConfig,
        daemon_env: &BTreeMap<String, String>,
        default_dir: &std::path::Path,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let mut env = daemon_env.clone();
        env.extend(cfg.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let working_dir = match &cfg.working_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => default_dir.join(dir),
            None => default_dir.to_path_buf(),
        };
        Self::new(
            CommandSpec {
                label: format!("action:{id}"),
                program: cfg.command.clone(),
                args: cfg.args.clone(),
                env,
                working_dir,
                timeout: cfg.timeout,
            },
            runner,
        )
    }
}

impl RemediationAction for CommandAction {
    fn execute(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let output = self.runner.run(self.spec.clone(), cancel).await;
            if output.success() {
                Ok(())
            } else {
                Err(JobwardenError::RemediationFailed(output.describe()))
            }
        })
    }
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn RemediationAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`CommandAction`] per `[action.<id>]` section.
    pub fn from_config(cfg: &ConfigFile, runner: Arc<dyn ProcessRunner>) -> Self {
        let mut registry = Self::new();
        for (id, action) in cfg.action.iter() {
            registry.register(
                id.clone(),
                Arc::new(CommandAction::from_config(
                    id,
                    action,
                    &cfg.daemon.env,
                    &cfg.daemon.working_dir,
                    runner.clone(),
                )),
            );
        }
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, action: Arc<dyn RemediationAction>) {
        self.actions.insert(id.into(), action);
    }

    pub fn resolve(&self, id: &str) -> Option<Arc<dyn RemediationAction>> {
        self.actions.get(id).cloned()
    }
}
