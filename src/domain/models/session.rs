//! Per-group-per-run mutable context shared between a group's tasks.

use std::path::PathBuf;

use serde_json::Value;

use crate::concurrency::SafeMap;

/// Created at group start, mutated only by tasks of that group, and
/// destroyed (along with its workdir) at group end unless the group's
/// cleanup predicate vetoes removal.
pub struct SharedSession {
    pub workdir: PathBuf,
    slots: SafeMap<Value>,
}

impl SharedSession {
    #[must_use]
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir, slots: SafeMap::new() }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.slots.insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.slots.get(key)
    }
}

impl std::fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession").field("workdir", &self.workdir).finish_non_exhaustive()
    }
}
