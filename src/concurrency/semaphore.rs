//! Counting semaphore backed by a bounded token channel.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// A counting semaphore of capacity `C`, implemented as a bounded channel
/// of tokens: acquiring is receiving a token, releasing is sending one back.
pub struct Semaphore {
    capacity: usize,
    sender: mpsc::Sender<()>,
    receiver: Mutex<mpsc::Receiver<()>>,
}

/// A held permit; releases automatically on drop.
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
    released: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.semaphore.sender.try_send(());
        }
    }
}

impl Semaphore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        for _ in 0..capacity {
            let _ = sender.try_send(());
        }
        Self {
            capacity,
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Block until a permit is available.
    pub async fn acquire(&self) -> Permit<'_> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.expect("semaphore sender never dropped while self is alive");
        Permit { semaphore: self, released: false }
    }

    /// Acquire without blocking; `None` if no permit is immediately available.
    pub async fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut receiver = self.receiver.lock().await;
        match receiver.try_recv() {
            Ok(()) => Some(Permit { semaphore: self, released: false }),
            Err(_) => None,
        }
    }

    /// Block up to `timeout` for a permit.
    pub async fn acquire_with_timeout(&self, timeout: Duration) -> Option<Permit<'_>> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(())) => Some(Permit { semaphore: self, released: false }),
            _ => None,
        }
    }

    /// Number of permits currently available (best-effort, racy by nature).
    pub async fn available(&self) -> usize {
        self.receiver.lock().await.len()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_release_round_trip() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.available().await, 2);
        let p1 = sem.acquire().await;
        assert_eq!(sem.available().await, 1);
        drop(p1);
        tokio::task::yield_now().await;
        assert_eq!(sem.available().await, 2);
    }

    #[tokio::test]
    async fn try_acquire_fails_when_exhausted() {
        let sem = Semaphore::new(1);
        let _p1 = sem.acquire().await;
        assert!(sem.try_acquire().await.is_none());
    }

    #[tokio::test]
    async fn acquire_with_timeout_expires() {
        let sem = Semaphore::new(1);
        let _p1 = sem.acquire().await;
        let result = sem.acquire_with_timeout(Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn blocked_acquire_unblocks_on_release() {
        let sem = Arc::new(Semaphore::new(1));
        let permit = sem.acquire().await;
        let sem2 = Arc::clone(&sem);
        let handle = tokio::spawn(async move {
            let _p = sem2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(permit);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("acquire should unblock")
            .unwrap();
    }
}
