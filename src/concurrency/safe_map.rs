//! String-keyed map guarded by a single read-write lock.
//!
//! Reads and writes are serialized through [`std::sync::RwLock`]; `for_each`
//! iterates a point-in-time snapshot so callers cannot deadlock by mutating
//! the map from within the callback.

use std::collections::HashMap;
use std::sync::RwLock;

/// A concurrent string-keyed map with snapshot-isolated iteration.
pub struct SafeMap<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V: Clone> SafeMap<V> {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.write().expect("safe map lock poisoned").insert(key.into(), value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.read().expect("safe map lock poisoned").get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.write().expect("safe map lock poisoned").remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().expect("safe map lock poisoned").contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("safe map lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over a snapshot of the map taken at call time. Mutations made
    /// by `f` to the map itself are not visible to later iterations of `f`.
    pub fn for_each(&self, mut f: impl FnMut(&str, &V)) {
        let snapshot: Vec<(String, V)> = {
            let guard = self.inner.read().expect("safe map lock poisoned");
            guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (key, value) in &snapshot {
            f(key, value);
        }
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().expect("safe map lock poisoned").keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.write().expect("safe map lock poisoned").clear();
    }
}

impl<V: Clone> Default for SafeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
