use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::JobHandle;

/// In-flight repairs keyed by the path under repair
///
/// Not synchronized; the owner serializes access.
#[derive(Default)]
pub struct RepairRegistry {
    repairs: BTreeMap<String, Arc<dyn JobHandle>>,
}

impl RepairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `job` under `key`, returning the job previously tracked there
    pub fn insert(&mut self, key: impl Into<String>, job: Arc<dyn JobHandle>) -> Option<Arc<dyn JobHandle>> {
        self.repairs.insert(key.into(), job)
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn JobHandle>> {
        self.repairs.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn JobHandle>> {
        self.repairs.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.repairs.contains_key(key)
    }

    /// Snapshot of all entries in key order
    pub fn entries(&self) -> Vec<(String, Arc<dyn JobHandle>)> {
        self.repairs
            .iter()
            .map(|(key, job)| (key.clone(), job.clone()))
            .collect()
    }

    /// Remove and return every entry
    pub fn drain(&mut self) -> Vec<(String, Arc<dyn JobHandle>)> {
        std::mem::take(&mut self.repairs).into_iter().collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.repairs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.repairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }
}
