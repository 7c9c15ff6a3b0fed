//! Memory snapshotting and the pure threshold checks the monitoring and
//! housekeeping loops run every tick.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::domain::models::{CoreStats, MemoryStats};
use crate::infrastructure::config::MonitoringConfig;

/// Wraps a `sysinfo::System` refreshed on demand; one instance is shared by
/// the monitoring loop so fresh samples don't need a full `System::new()`
/// each tick.
pub struct MemorySampler {
    system: System,
}

impl MemorySampler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new_with_specifics(
                RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
            ),
        }
    }

    /// Refresh and snapshot process memory usage against `max_bytes`.
    pub fn sample(&mut self, max_bytes: u64) -> MemoryStats {
        self.system.refresh_memory();
        MemoryStats { used_bytes: self.system.used_memory(), max_bytes }
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Warnings the monitoring loop logs when a `CoreStats` snapshot crosses a
/// configured threshold. Pure and synchronous so it is testable without a
/// running loop.
#[must_use]
pub fn monitoring_warnings(stats: &CoreStats, cfg: &MonitoringConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if stats.active_worker_threads > cfg.max_worker_threads {
        warnings.push(format!(
            "active worker threads {} exceeds max_worker_threads {}",
            stats.active_worker_threads, cfg.max_worker_threads
        ));
    }

    if stats.memory.usage_ratio() > cfg.memory_warn_ratio {
        warnings.push(format!(
            "memory usage {:.1}% exceeds warn threshold {:.1}%",
            stats.memory.usage_ratio() * 100.0,
            cfg.memory_warn_ratio * 100.0
        ));
    }

    if stats.worker_pool.queued > 2 * stats.worker_pool.workers {
        warnings.push(format!(
            "queued work {} exceeds 2x worker count {}",
            stats.worker_pool.queued,
            2 * stats.worker_pool.workers
        ));
    }

    let total = stats.worker_pool.completed + stats.worker_pool.failed;
    if total > 0 {
        let failure_rate = stats.worker_pool.failed as f64 / total as f64;
        if failure_rate > cfg.failure_rate_warn_ratio {
            warnings.push(format!(
                "failure rate {:.1}% exceeds warn threshold {:.1}%",
                failure_rate * 100.0,
                cfg.failure_rate_warn_ratio * 100.0
            ));
        }
    }

    warnings
}

/// Whether the housekeeping loop should trigger a GC this tick.
#[must_use]
pub fn should_trigger_gc(memory: &MemoryStats, cfg: &MonitoringConfig) -> bool {
    memory.usage_ratio() > cfg.memory_gc_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::WorkerPoolStats;
    use crate::reliability::CircuitStats;

    fn stats(worker_pool: WorkerPoolStats, memory: MemoryStats, active_worker_threads: usize) -> CoreStats {
        CoreStats {
            worker_pool,
            circuits: Vec::<CircuitStats>::new(),
            memory,
            active_worker_threads,
            error_collector_len: 0,
        }
    }

    fn pool(workers: usize, queued: usize, completed: u64, failed: u64) -> WorkerPoolStats {
        WorkerPoolStats { workers, queue_capacity: workers * 2, queued, completed, failed }
    }

    #[test]
    fn no_warnings_under_thresholds() {
        let cfg = MonitoringConfig::default();
        let s = stats(pool(4, 1, 10, 0), MemoryStats { used_bytes: 100, max_bytes: 1000 }, 4);
        assert!(monitoring_warnings(&s, &cfg).is_empty());
    }

    #[test]
    fn warns_on_excess_queue_depth() {
        let cfg = MonitoringConfig::default();
        let s = stats(pool(4, 9, 10, 0), MemoryStats { used_bytes: 100, max_bytes: 1000 }, 4);
        let warnings = monitoring_warnings(&s, &cfg);
        assert!(warnings.iter().any(|w| w.contains("queued work")));
    }

    #[test]
    fn warns_on_high_memory_usage() {
        let cfg = MonitoringConfig::default();
        let s = stats(pool(4, 0, 10, 0), MemoryStats { used_bytes: 900, max_bytes: 1000 }, 4);
        let warnings = monitoring_warnings(&s, &cfg);
        assert!(warnings.iter().any(|w| w.contains("memory usage")));
    }

    #[test]
    fn warns_on_high_failure_rate() {
        let cfg = MonitoringConfig::default();
        let s = stats(pool(4, 0, 8, 2), MemoryStats { used_bytes: 100, max_bytes: 1000 }, 4);
        let warnings = monitoring_warnings(&s, &cfg);
        assert!(warnings.iter().any(|w| w.contains("failure rate")));
    }

    #[test]
    fn warns_on_excess_worker_threads() {
        let cfg = MonitoringConfig::default();
        let s = stats(pool(4, 0, 10, 0), MemoryStats { used_bytes: 100, max_bytes: 1000 }, 1000);
        let warnings = monitoring_warnings(&s, &cfg);
        assert!(warnings.iter().any(|w| w.contains("worker threads")));
    }

    #[test]
    fn gc_triggers_past_configured_ratio() {
        let cfg = MonitoringConfig::default();
        assert!(!should_trigger_gc(&MemoryStats { used_bytes: 500, max_bytes: 1000 }, &cfg));
        assert!(should_trigger_gc(&MemoryStats { used_bytes: 750, max_bytes: 1000 }, &cfg));
    }
}
