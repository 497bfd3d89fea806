// src/exec/running.rs

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ids of workflows that currently have a run in flight.
///
/// Membership is checked-and-set atomically in [`RunningSet::try_acquire`];
/// the returned guard removes the id when dropped, so every exit path of a
/// run (success, failure, timeout, panic) releases it.
#[derive(Debug, Clone, Default)]
pub struct RunningSet {
    inner: Arc<Mutex<BTreeSet<String>>>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim `id`, or `None` if a run of it is already in flight.
    pub fn try_acquire(&self, id: &str) -> Option<RunGuard> {
        if self.lock().insert(id.to_string()) {
            Some(RunGuard {
                set: self.clone(),
                id: id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }
}

#[derive(Debug)]
pub struct RunGuard {
    set: RunningSet,
    id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.id);
    }
}
