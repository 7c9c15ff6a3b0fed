//! Pool of single-use tokens.
//!
//! Each token can be taken exactly once; a spent token is replaced by
//! putting a fresh one back, rather than being reused itself.

use std::collections::VecDeque;
use std::sync::Mutex;

/// A pool of values that are handed out once each and replenished by `put`.
pub struct OncePool<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> OncePool<T> {
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self { items: Mutex::new(items.into_iter().collect()) }
    }

    /// Take one item from the pool, if any remain.
    pub fn take(&self) -> Option<T> {
        self.items.lock().expect("once pool lock poisoned").pop_front()
    }

    /// Replenish the pool with a fresh item.
    pub fn put(&self, item: T) {
        self.items.lock().expect("once pool lock poisoned").push_back(item);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().expect("once pool lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_exhausts_then_put_replenishes() {
        let pool = OncePool::new(vec![1, 2]);
        assert_eq!(pool.take(), Some(1));
        assert_eq!(pool.take(), Some(2));
        assert_eq!(pool.take(), None);
        pool.put(3);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.take(), Some(3));
    }

    #[test]
    fn empty_pool_reports_empty() {
        let pool: OncePool<i32> = OncePool::new(Vec::new());
        assert!(pool.is_empty());
        assert_eq!(pool.take(), None);
    }
}
