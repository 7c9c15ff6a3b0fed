//! Hierarchical configuration: programmatic defaults, an optional YAML
//! file, then environment variables (`SLOTH_RUNNER_` prefix), merged with
//! `figment`.

use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration for the core engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoreConfig {
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub error_collector: ErrorCollectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            timeouts: TimeoutsConfig::default(),
            monitoring: MonitoringConfig::default(),
            error_collector: ErrorCollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerPoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

const fn default_workers() -> usize {
    4
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { workers: default_workers() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

const fn default_max_failures() -> u32 {
    5
}

const fn default_reset_timeout_secs() -> u64 {
    30
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimiterConfig {
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,
    #[serde(default = "default_capacity")]
    pub capacity: f64,
}

const fn default_rate_per_sec() -> f64 {
    10.0
}

const fn default_capacity() -> f64 {
    10.0
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            capacity: default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutsConfig {
    #[serde(default = "default_task_timeout_secs")]
    pub default_task_timeout_secs: u64,
    #[serde(default = "default_network_overhead_secs")]
    pub network_overhead_secs: u64,
}

const fn default_task_timeout_secs() -> u64 {
    30
}

const fn default_network_overhead_secs() -> u64 {
    5
}

impl TimeoutsConfig {
    #[must_use]
    pub fn default_task_timeout(&self) -> Duration {
        Duration::from_secs(self.default_task_timeout_secs)
    }

    /// The timeout budget an agent call gets: the task timeout minus the
    /// network overhead deducted for connect/send/receive round trips,
    /// floored at one second.
    #[must_use]
    pub fn agent_call_budget(&self) -> Duration {
        let secs = self
            .default_task_timeout_secs
            .saturating_sub(self.network_overhead_secs)
            .max(1);
        Duration::from_secs(secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            default_task_timeout_secs: default_task_timeout_secs(),
            network_overhead_secs: default_network_overhead_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitoringConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
    #[serde(default = "default_gc_interval_secs")]
    pub gc_interval_secs: u64,
    #[serde(default = "default_max_worker_threads")]
    pub max_worker_threads: usize,
    #[serde(default = "default_memory_warn_ratio")]
    pub memory_warn_ratio: f64,
    #[serde(default = "default_memory_gc_ratio")]
    pub memory_gc_ratio: f64,
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: u64,
    #[serde(default = "default_failure_rate_warn_ratio")]
    pub failure_rate_warn_ratio: f64,
}

const fn default_metrics_interval_secs() -> u64 {
    15
}

const fn default_gc_interval_secs() -> u64 {
    60
}

const fn default_max_worker_threads() -> usize {
    64
}

const fn default_memory_warn_ratio() -> f64 {
    0.8
}

const fn default_memory_gc_ratio() -> f64 {
    0.7
}

const fn default_max_memory_bytes() -> u64 {
    1024 * 1024 * 1024
}

const fn default_failure_rate_warn_ratio() -> f64 {
    0.1
}

impl MonitoringConfig {
    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    #[must_use]
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: default_metrics_interval_secs(),
            gc_interval_secs: default_gc_interval_secs(),
            max_worker_threads: default_max_worker_threads(),
            memory_warn_ratio: default_memory_warn_ratio(),
            memory_gc_ratio: default_memory_gc_ratio(),
            max_memory_bytes: default_max_memory_bytes(),
            failure_rate_warn_ratio: default_failure_rate_warn_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorCollectorConfig {
    #[serde(default = "default_error_collector_capacity")]
    pub capacity: usize,
}

const fn default_error_collector_capacity() -> usize {
    1000
}

impl Default for ErrorCollectorConfig {
    fn default() -> Self {
        Self { capacity: default_error_collector_capacity() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker_pool.workers must be at least 1")]
    ZeroWorkers,
    #[error("error_collector.capacity must be at least 1")]
    ZeroErrorCollectorCapacity,
    #[error("circuit_breaker.max_failures must be at least 1")]
    ZeroMaxFailures,
    #[error("timeouts.default_task_timeout_secs must be strictly positive")]
    NonPositiveTaskTimeout,
    #[error("rate_limiter.rate_per_sec must be strictly positive")]
    NonPositiveRate,
    #[error("logging.level must be one of: trace, debug, info, warn, error (got '{0}')")]
    InvalidLogLevel(String),
    #[error("logging.format must be one of: json, pretty (got '{0}')")]
    InvalidLogFormat(String),
    #[error(transparent)]
    Extract(#[from] figment::Error),
}

/// Loads and validates [`CoreConfig`] from defaults, an optional YAML file,
/// and environment variables.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from programmatic defaults, `sloth-runner.yaml` in the current
    /// directory (if present), and `SLOTH_RUNNER_`-prefixed env vars.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if extraction or validation fails.
    pub fn load() -> Result<CoreConfig, ConfigError> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file("sloth-runner.yaml"))
            .merge(Env::prefixed("SLOTH_RUNNER_").split("__"))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from a specific YAML file plus defaults and env vars.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if extraction or validation fails.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CoreConfig, ConfigError> {
        let config: CoreConfig = Figment::new()
            .merge(Serialized::defaults(CoreConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("SLOTH_RUNNER_").split("__"))
            .extract()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// # Errors
    /// Returns the first violated validation rule.
    pub fn validate(config: &CoreConfig) -> Result<(), ConfigError> {
        if config.worker_pool.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if config.error_collector.capacity == 0 {
            return Err(ConfigError::ZeroErrorCollectorCapacity);
        }
        if config.circuit_breaker.max_failures == 0 {
            return Err(ConfigError::ZeroMaxFailures);
        }
        if config.timeouts.default_task_timeout_secs == 0 {
            return Err(ConfigError::NonPositiveTaskTimeout);
        }
        if config.rate_limiter.rate_per_sec <= 0.0 {
            return Err(ConfigError::NonPositiveRate);
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CoreConfig::default();
        ConfigLoader::validate(&config).expect("default config should validate");
        assert_eq!(config.worker_pool.workers, 4);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = CoreConfig::default();
        config.worker_pool.workers = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut config = CoreConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let mut config = CoreConfig::default();
        config.rate_limiter.rate_per_sec = 0.0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::NonPositiveRate)));
    }

    #[test]
    fn load_from_file_merges_overrides() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_pool:\n  workers: 9\nlogging:\n  level: debug").unwrap();
        file.flush().unwrap();
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.worker_pool.workers, 9);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json", "unset fields keep their default");
    }

    #[test]
    fn agent_call_budget_deducts_network_overhead() {
        let config = TimeoutsConfig {
            default_task_timeout_secs: 30,
            network_overhead_secs: 5,
        };
        assert_eq!(config.agent_call_budget(), Duration::from_secs(25));
    }
}
