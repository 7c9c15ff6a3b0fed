//! Tracing subscriber setup driven by [`LoggingConfig`].

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::config::LoggingConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
}

/// Initialize the global `tracing` subscriber from `config`. A second call
/// in the same process (common across test binaries) is tolerated as a
/// no-op rather than treated as an error.
///
/// # Errors
/// Returns [`LoggingError::InvalidLevel`] if `config.level` does not parse.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let level = parse_level(&config.level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let result = match config.format.as_str() {
        "pretty" => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry().with(env_filter).with(layer).try_init()
        }
        _ => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true);
            tracing_subscriber::registry().with(env_filter).with(layer).try_init()
        }
    };

    // A second init in the same process fails with `TryInitError`; treated
    // as a no-op since tests commonly initialize logging more than once.
    let _ = result;
    Ok(())
}

fn parse_level(level: &str) -> Result<Level, LoggingError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(LoggingError::InvalidLevel(other.to_string())),
    }
}
