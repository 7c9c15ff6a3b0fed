//! Named, cancellable deadlines that outlive a single attempt.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

type OnTimeout = Box<dyn FnOnce() + Send + 'static>;

/// Tracks in-flight deadlines by id. Starting a new deadline under an id
/// already in use cancels the previous one first.
#[derive(Default)]
pub struct TimeoutManager {
    handles: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
}

impl TimeoutManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a deadline under `id`. When `d` elapses, logs and runs
    /// `on_timeout`. Replaces (cancelling) any existing deadline under the
    /// same id.
    pub fn start(&self, id: impl Into<String>, d: Duration, on_timeout: OnTimeout) {
        let id = id.into();
        self.cancel(&id);

        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(d).await;
            debug!(id = %task_id, "timeout elapsed");
            on_timeout();
        });

        self.handles.lock().expect("timeout manager lock poisoned").insert(id, handle);
    }

    /// Cancel the deadline under `id`, if any.
    pub fn cancel(&self, id: &str) {
        if let Some(handle) = self.handles.lock().expect("timeout manager lock poisoned").remove(id) {
            handle.abort();
        }
    }

    /// Cancel every active deadline.
    pub fn cancel_all(&self) {
        let mut handles = self.handles.lock().expect("timeout manager lock poisoned");
        for (_, handle) in handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_on_timeout_after_deadline() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        manager.start("a", Duration::from_millis(20), Box::new(move || {
            fired2.store(true, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_prevents_timeout_firing() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        manager.start("a", Duration::from_millis(30), Box::new(move || {
            fired2.store(true, Ordering::SeqCst);
        }));
        manager.cancel("a");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn restarting_same_id_replaces_previous_deadline() {
        let manager = TimeoutManager::new();
        let count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        manager.start("a", Duration::from_millis(100), Box::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        let count3 = Arc::clone(&count);
        manager.start("a", Duration::from_millis(20), Box::new(move || {
            count3.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_all_stops_every_deadline() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        manager.start("a", Duration::from_millis(30), Box::new(move || {
            fired2.store(true, Ordering::SeqCst);
        }));
        manager.cancel_all();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
