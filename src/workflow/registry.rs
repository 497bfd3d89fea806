// src/workflow/registry.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ConfigFile;
use crate::workflow::WorkflowDefinition;

/// Read-only catalog of workflow definitions, keyed by id.
///
/// Built once at startup; changing a definition requires a restart.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    defs: BTreeMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let defs = cfg
            .workflow
            .iter()
            .map(|(id, wf)| {
                (
                    id.clone(),
                    Arc::new(WorkflowDefinition::from_config(id, wf, &cfg.daemon)),
                )
            })
            .collect();
        Self { defs }
    }

    pub fn from_definitions(defs: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        Self {
            defs: defs
                .into_iter()
                .map(|d| (d.id.clone(), Arc::new(d)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.defs.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    /// Definitions the scheduler should bind a trigger to.
    pub fn schedulable(&self) -> impl Iterator<Item = &Arc<WorkflowDefinition>> {
        self.defs.values().filter(|d| d.is_schedulable())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
