//! Reusable cyclic barrier.
//!
//! `N` parties call `wait`; the last arrival releases everyone and opens a
//! fresh round by incrementing a generation counter, so the barrier can be
//! reused indefinitely.

use std::sync::Arc;

use tokio::sync::Notify;

struct Inner {
    parties: usize,
    state: std::sync::Mutex<BarrierState>,
    notify: Notify,
}

struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// A reusable barrier for `parties` participants.
#[derive(Clone)]
pub struct Barrier {
    inner: Arc<Inner>,
}

impl Barrier {
    #[must_use]
    pub fn new(parties: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                parties: parties.max(1),
                state: std::sync::Mutex::new(BarrierState { arrived: 0, generation: 0 }),
            notify: Notify::new(),
            }),
        }
    }

    /// Block until `parties` calls to `wait` have arrived for the current
    /// generation, then release all of them and advance the generation.
    pub async fn wait(&self) -> u64 {
        let my_generation = {
            let mut state = self.inner.state.lock().expect("barrier lock poisoned");
            state.arrived += 1;
            let generation = state.generation;
            if state.arrived >= self.inner.parties {
                state.arrived = 0;
                state.generation += 1;
                self.inner.notify.notify_waiters();
                return state.generation;
            }
            generation
        };

        loop {
            let notified = self.inner.notify.notified();
            {
                let state = self.inner.state.lock().expect("barrier lock poisoned");
                if state.generation != my_generation {
                    return state.generation;
                }
            }
            notified.await;
            let state = self.inner.state.lock().expect("barrier lock poisoned");
            if state.generation != my_generation {
                return state.generation;
            }
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().expect("barrier lock poisoned").generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn releases_all_parties_once_full() {
        let barrier = Barrier::new(3);
        let reached = StdArc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let barrier = barrier.clone();
            let reached = StdArc::clone(&reached);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                reached.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for h in handles {
            tokio::time::timeout(Duration::from_secs(1), h).await.unwrap().unwrap();
        }
        assert_eq!(reached.load(Ordering::SeqCst), 3);
        assert_eq!(barrier.generation(), 1);
    }

    #[tokio::test]
    async fn is_reusable_across_generations() {
        let barrier = Barrier::new(2);
        for expected_gen in 1..=3u64 {
            let b1 = barrier.clone();
            let b2 = barrier.clone();
            let h1 = tokio::spawn(async move { b1.wait().await });
            let h2 = tokio::spawn(async move { b2.wait().await });
            let (g1, g2) = tokio::join!(h1, h2);
            assert_eq!(g1.unwrap(), expected_gen);
            assert_eq!(g2.unwrap(), expected_gen);
        }
    }
}
