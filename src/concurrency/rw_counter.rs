//! Signed counter guarded by a read-write lock.

use std::sync::RwLock;

/// A 64-bit signed counter safe for concurrent increment/decrement.
pub struct RwCounter {
    value: RwLock<i64>,
}

impl RwCounter {
    #[must_use]
    pub fn new(initial: i64) -> Self {
        Self { value: RwLock::new(initial) }
    }

    pub fn increment(&self) -> i64 {
        self.add(1)
    }

    pub fn decrement(&self) -> i64 {
        self.add(-1)
    }

    pub fn add(&self, delta: i64) -> i64 {
        let mut value = self.value.write().expect("counter lock poisoned");
        *value += delta;
        *value
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        *self.value.read().expect("counter lock poisoned")
    }

    pub fn set(&self, new_value: i64) {
        *self.value.write().expect("counter lock poisoned") = new_value;
    }

    /// Reset to zero, returning the value immediately before the reset.
    pub fn reset(&self) -> i64 {
        let mut value = self.value.write().expect("counter lock poisoned");
        let old = *value;
        *value = 0;
        old
    }
}

impl Default for RwCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
