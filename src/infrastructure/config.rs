//! Configuration management
//!
//! Settings are read from a YAML file (`pipewright.yaml` by default). A
//! missing default file means defaults; an explicitly requested file must
//! exist.

use crate::pipeline::ValidationOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "pipewright.yaml";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },

    /// The file is not valid YAML for [`Config`]
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// File that was requested
        path: PathBuf,
        /// Underlying parse error
        source: serde_yaml::Error,
    },

    /// A setting has an unusable value
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Output encoding for rendered documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// YAML, the format the orchestration engine reads
    #[default]
    Yaml,
    /// Pretty-printed JSON
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Log level, overridden by `PIPEWRIGHT_LOG`
    pub log_level: String,
    /// Default output format of `render`
    pub output_format: OutputFormat,
    /// Resource types the engine provides without declaration
    pub base_resource_types: Vec<String>,
    /// Team the pipelines belong to, shown in summaries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            output_format: OutputFormat::Yaml,
            base_resource_types: Vec::new(),
            team: None,
        }
    }
}

impl Config {
    /// Parses configuration from YAML text
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML, unknown keys or empty base type names.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        config.check()?;
        Ok(config)
    }

    /// Loads configuration from `path`
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_yaml(&text, path)
    }

    /// Loads `path` if given, otherwise [`DEFAULT_CONFIG_FILE`] in `dir` if it
    /// exists, otherwise defaults
    ///
    /// # Errors
    ///
    /// Fails if a requested or discovered file cannot be read or parsed.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = dir.join(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            Self::load(&default)
        } else {
            debug!("no config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Options for the pipeline validator
    pub fn validation_options(&self) -> ValidationOptions {
        ValidationOptions {
            base_resource_types: self.base_resource_types.clone(),
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level cannot be empty".to_string()));
        }
        if self.base_resource_types.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "base_resource_types cannot contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}
