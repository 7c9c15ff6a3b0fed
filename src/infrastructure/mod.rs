//! Ambient infrastructure: configuration loading and logging setup.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigLoader, CoreConfig};
pub use logging::LoggingError;
