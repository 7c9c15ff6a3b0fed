//! Bounded worker pool.
//!
//! A fixed number of workers drain a bounded handoff channel. Submission is
//! non-blocking by default; callers decide whether to retry or fail when
//! the queue is full.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Read-only snapshot of a [`WorkerPool`]'s counters.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Fixed-size worker pool with a bounded queue of capacity `2 * workers`.
pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    workers: usize,
    queue_capacity: usize,
    queued: Arc<AtomicUsize>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    closed: Arc<std::sync::atomic::AtomicBool>,
    handles: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkerPool {
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let queue_capacity = workers * 2;
        let (sender, receiver) = mpsc::channel::<Job>(queue_capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let queued = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let receiver = Arc::clone(&receiver);
            let queued = Arc::clone(&queued);
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);
            let handle = tokio::spawn(async move {
                loop {
                    let job = {
                        let mut receiver = receiver.lock().await;
                        receiver.recv().await
                    };
                    let Some(job) = job else { break };
                    queued.fetch_sub(1, Ordering::SeqCst);
                    let result = catch_unwind(AssertUnwindSafe(job));
                    match result {
                        Ok(()) => {
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(panic) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            warn!(?panic, "worker pool job panicked");
                        }
                    }
                }
            });
            handles.push(handle);
        }

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            workers,
            queue_capacity,
            queued,
            completed,
            failed,
            closed,
            handles: std::sync::Mutex::new(handles),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Job>> {
        self.sender.lock().expect("worker pool sender lock poisoned").clone()
    }

    /// Submit a job without blocking. Returns `false` if the queue is full
    /// or the pool is shutting down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(sender) = self.sender() else { return false };
        match sender.try_send(Box::new(job)) {
            Ok(()) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Submit a job, blocking up to `timeout` for room in the queue.
    pub async fn submit_with_timeout<F>(&self, job: F, timeout: Duration) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(sender) = self.sender() else { return false };
        let sent = tokio::time::timeout(timeout, sender.send(Box::new(job))).await;
        match sent {
            Ok(Ok(())) => {
                self.queued.fetch_add(1, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            queued: self.queued.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    /// Signal shutdown, drop the sender so the channel closes once the
    /// queue drains, then wait for every worker to exit.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let sender = self.sender.lock().expect("worker pool sender lock poisoned").take();
        drop(sender);

        let handles = std::mem::take(&mut *self.handles.lock().expect("worker pool handles lock poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
    }
}
