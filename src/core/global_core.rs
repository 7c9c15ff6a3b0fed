//! The global core: worker pool, circuit breakers, panic recovery and the
//! monitoring/housekeeping loops, wired together as one singleton context.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::concurrency::{SafeMap, WorkerPool};
use crate::domain::error::{ErrorCollector, Severity, StructuredError};
use crate::domain::models::CoreStats;
use crate::infrastructure::config::CoreConfig;
use crate::reliability::CircuitBreaker;

use super::monitor::{monitoring_warnings, should_trigger_gc, MemorySampler};
use super::timeout_manager::TimeoutManager;

/// External dependency names the core pre-creates a circuit breaker for.
const PRE_CREATED_CIRCUITS: &[&str] = &[
    "http_external",
    "database",
    "filesystem",
    "docker_daemon",
    "kubernetes_api",
    "cloud_provider",
];

static GLOBAL_CORE: OnceLock<Arc<GlobalCore>> = OnceLock::new();

/// Composes the worker pool, circuit breakers and panic-recovery envelope
/// behind a single entry point, plus the background monitoring and
/// housekeeping loops.
pub struct GlobalCore {
    config: CoreConfig,
    worker_pool: WorkerPool,
    circuits: SafeMap<Arc<CircuitBreaker>>,
    error_collector: Arc<ErrorCollector>,
    timeout_manager: Arc<TimeoutManager>,
    active_worker_threads: AtomicUsize,
    shutdown: Arc<Notify>,
    loops: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl GlobalCore {
    /// Crate-visible so tests elsewhere in the crate can build a core
    /// without going through the process-wide singleton.
    pub(crate) fn new(config: CoreConfig) -> Arc<Self> {
        let worker_pool = WorkerPool::new(config.worker_pool.workers);
        let circuits = SafeMap::new();
        for name in PRE_CREATED_CIRCUITS {
            circuits.insert(
                (*name).to_string(),
                Arc::new(CircuitBreaker::new(
                    *name,
                    config.circuit_breaker.max_failures,
                    config.circuit_breaker.reset_timeout(),
                )),
            );
        }
        let error_collector = Arc::new(ErrorCollector::new(config.error_collector.capacity));

        Arc::new(Self {
            config,
            worker_pool,
            circuits,
            error_collector,
            timeout_manager: Arc::new(TimeoutManager::new()),
            active_worker_threads: AtomicUsize::new(0),
            shutdown: Arc::new(Notify::new()),
            loops: std::sync::Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    #[must_use]
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.worker_pool
    }

    #[must_use]
    pub fn error_collector(&self) -> &Arc<ErrorCollector> {
        &self.error_collector
    }

    #[must_use]
    pub fn timeout_manager(&self) -> &Arc<TimeoutManager> {
        &self.timeout_manager
    }

    /// Returns the pre-created breaker for `name`, or lazily creates one
    /// with the configured default thresholds.
    pub fn get_circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuits.get(name) {
            return breaker;
        }
        let breaker = Arc::new(CircuitBreaker::new(
            name,
            self.config.circuit_breaker.max_failures,
            self.config.circuit_breaker.reset_timeout(),
        ));
        self.circuits.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshot pool/circuit/memory/error-collector stats for the
    /// monitoring loop and anyone else asking "how is the core doing".
    pub fn stats(&self, sampler: &mut MemorySampler) -> CoreStats {
        let mut circuits = Vec::new();
        self.circuits.for_each(|_, breaker| circuits.push(breaker.stats()));
        CoreStats {
            worker_pool: self.worker_pool.stats(),
            circuits,
            memory: sampler.sample(self.config.monitoring.max_memory_bytes),
            active_worker_threads: self.active_worker_threads.load(Ordering::SeqCst),
            error_collector_len: self.error_collector.len(),
        }
    }

    /// The single entry point every task execution goes through: runs `f`
    /// inside a panic trap, annotates any resulting error with
    /// `context_tag`, feeds the error collector, and logs timing.
    pub fn execute_with_recovery<T>(
        &self,
        f: impl FnOnce() -> Result<T, StructuredError> + std::panic::UnwindSafe,
        context_tag: &str,
    ) -> Result<T, StructuredError> {
        self.active_worker_threads.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(f));
        self.active_worker_threads.fetch_sub(1, Ordering::SeqCst);
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(inner) => inner,
            Err(panic) => {
                let detail = panic.downcast_ref::<&str>().map_or_else(
                    || panic.downcast_ref::<String>().cloned().unwrap_or_else(|| "non-string panic payload".to_string()),
                    |s| (*s).to_string(),
                );
                error!(panic = %detail, context_tag, "recovered from panic in execute_with_recovery");
                Err(StructuredError::new("panic_recovered", "task panicked", Severity::Critical)
                    .with_detail("panic", detail)
                    .with_retryable(false))
            }
        };

        match &result {
            Ok(_) => {
                debug!(context_tag, elapsed_ms = elapsed.as_millis() as u64, "execute_with_recovery succeeded");
            }
            Err(err) => {
                let annotated = err.clone().with_context(context_tag);
                self.error_collector.push(annotated);
                warn!(
                    context_tag,
                    code = %err.code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "execute_with_recovery failed"
                );
            }
        }

        result
    }

    /// Async counterpart to [`Self::execute_with_recovery`] for attempts
    /// that need to await I/O (the agent RPC, workspace archive/extract).
    /// Shares the same panic-trapping, context-annotation and
    /// error-collector bookkeeping, via `futures::FutureExt::catch_unwind`
    /// instead of `std::panic::catch_unwind`.
    pub async fn execute_with_recovery_async<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StructuredError>>,
        context_tag: &str,
    ) -> Result<T, StructuredError> {
        use futures::FutureExt;

        self.active_worker_threads.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let outcome = AssertUnwindSafe(fut).catch_unwind().await;
        self.active_worker_threads.fetch_sub(1, Ordering::SeqCst);
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(inner) => inner,
            Err(panic) => {
                let detail = panic.downcast_ref::<&str>().map_or_else(
                    || panic.downcast_ref::<String>().cloned().unwrap_or_else(|| "non-string panic payload".to_string()),
                    |s| (*s).to_string(),
                );
                error!(panic = %detail, context_tag, "recovered from panic in execute_with_recovery_async");
                Err(StructuredError::new("panic_recovered", "task panicked", Severity::Critical)
                    .with_detail("panic", detail)
                    .with_retryable(false))
            }
        };

        match &result {
            Ok(_) => {
                debug!(context_tag, elapsed_ms = elapsed.as_millis() as u64, "execute_with_recovery_async succeeded");
            }
            Err(err) => {
                let annotated = err.clone().with_context(context_tag);
                self.error_collector.push(annotated);
                warn!(
                    context_tag,
                    code = %err.code,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "execute_with_recovery_async failed"
                );
            }
        }

        result
    }

    fn spawn_loops(self: &Arc<Self>) {
        let core = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.config.monitoring.metrics_interval();
        let monitoring = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sampler = MemorySampler::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = core.stats(&mut sampler);
                        debug!(worker_pool = ?stats.worker_pool, memory = ?stats.memory, "monitoring snapshot");
                        for warning in monitoring_warnings(&stats, &core.config.monitoring) {
                            warn!("{warning}");
                        }
                    }
                    () = shutdown.notified() => break,
                }
            }
        });

        let core = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.config.monitoring.gc_interval();
        let housekeeping = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut sampler = MemorySampler::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = core.stats(&mut sampler);
                        if should_trigger_gc(&stats.memory, &core.config.monitoring) {
                            warn!(usage_ratio = stats.memory.usage_ratio(), "triggering gc");
                        }
                        let critical = core.error_collector.filter_by_severity(Severity::Critical).len();
                        let high = core.error_collector.filter_by_severity(Severity::High).len();
                        debug!(critical, high, "housekeeping pass");
                        if stats.error_collector_len >= core.config.error_collector.capacity {
                            core.error_collector.trim_to_half();
                        }
                    }
                    () = shutdown.notified() => break,
                }
            }
        });

        let mut loops = self.loops.lock().expect("global core loops lock poisoned");
        loops.push(monitoring);
        loops.push(housekeeping);
    }

    async fn stop(&self) {
        self.shutdown.notify_waiters();
        self.worker_pool.close().await;
        self.timeout_manager.cancel_all();
        let handles = std::mem::take(&mut *self.loops.lock().expect("global core loops lock poisoned"));
        for handle in handles {
            handle.abort();
        }
    }
}

/// Initialize the singleton global core. Idempotent: subsequent calls
/// return the already-initialized instance without reinitializing.
pub fn initialize_global_core(config: CoreConfig) -> Arc<GlobalCore> {
    GLOBAL_CORE
        .get_or_init(|| {
            let core = GlobalCore::new(config);
            core.spawn_loops();
            core
        })
        .clone()
}

/// Returns the initialized global core, or `None` if it was never
/// initialized.
#[must_use]
pub fn get_global_core() -> Option<Arc<GlobalCore>> {
    GLOBAL_CORE.get().cloned()
}

/// Stop the global core's background loops and worker pool. Idempotent:
/// stopping an uninitialized or already-stopped core is a no-op.
pub async fn shutdown_global_core() {
    if let Some(core) = GLOBAL_CORE.get() {
        core.stop().await;
    }
}
