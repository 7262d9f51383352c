//! Infrastructure layer
//!
//! Configuration files and logging setup.

mod config;
mod logging;

pub use config::{Config, ConfigError, DEFAULT_CONFIG_FILE, OutputFormat};
pub use logging::{LOG_ENV, env_filter, init_logging};
