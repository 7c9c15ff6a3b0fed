//! Read-only snapshot types surfaced by the monitoring loop.

use serde::Serialize;

use crate::concurrency::WorkerPoolStats;
use crate::reliability::CircuitStats;

/// Process memory snapshot, as read by the monitoring loop.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub used_bytes: u64,
    pub max_bytes: u64,
}

impl MemoryStats {
    #[must_use]
    pub fn usage_ratio(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.max_bytes as f64
    }
}

/// Aggregate snapshot of the global core's health, assembled once per
/// monitoring tick.
#[derive(Debug, Clone, Serialize)]
pub struct CoreStats {
    pub worker_pool: WorkerPoolStats,
    pub circuits: Vec<CircuitStats>,
    pub memory: MemoryStats,
    pub active_worker_threads: usize,
    pub error_collector_len: usize,
}
