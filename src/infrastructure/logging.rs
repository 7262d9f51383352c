//! Logging configuration
//!
//! Initializes tracing for the application.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that overrides the configured level
pub const LOG_ENV: &str = "PIPEWRIGHT_LOG";

/// Builds the filter: `PIPEWRIGHT_LOG` if set and valid, otherwise `level`
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initializes logging with the specified level
///
/// Logs go to stderr so rendered documents on stdout stay clean. Calling it
/// twice is harmless; the first subscriber wins.
pub fn init_logging(level: &str) {
    let _ = fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
