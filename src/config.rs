//! Configuration for the testing harness.
//!
//! Configuration can be built in code, loaded from a TOML file or read from
//! `JOBHARNESS_*` environment variables.

use crate::{HarnessError, mode::Mode};
use serde::{Deserialize, Serialize};

/// Main configuration for a [`Testing`](crate::Testing) context.
///
/// # Examples
///
/// ```rust
/// use jobharness::{HarnessConfig, Mode};
///
/// let config = HarnessConfig::new()
///     .with_mode(Mode::Inline)
///     .with_max_drain_iterations(1_000)
///     .with_log_level("debug");
///
/// assert_eq!(config.mode, Mode::Inline);
/// assert_eq!(config.max_drain_iterations, Some(1_000));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Mode a context starts in and returns to on reset
    pub mode: Mode,

    /// `retry` value the client fills in for records that carry none
    pub default_retry: bool,

    /// Fail a drain once it has executed this many jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_drain_iterations: Option<u64>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Fake,
            default_retry: true,
            max_drain_iterations: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_retry(mut self, retry: bool) -> Self {
        self.default_retry = retry;
        self
    }

    pub fn with_max_drain_iterations(mut self, limit: u64) -> Self {
        self.max_drain_iterations = Some(limit);
        self
    }

    pub fn with_log_level(mut self, level: &str) -> Self {
        self.logging.level = level.to_string();
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &str) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("JOBHARNESS_MODE") {
            config.mode = mode.parse()?;
        }
        if let Ok(retry) = std::env::var("JOBHARNESS_DEFAULT_RETRY") {
            config.default_retry = retry.parse().unwrap_or(config.default_retry);
        }
        if let Ok(limit) = std::env::var("JOBHARNESS_MAX_DRAIN_ITERATIONS") {
            let limit = limit.parse::<u64>().map_err(|e| {
                HarnessError::Config(format!("Invalid JOBHARNESS_MAX_DRAIN_ITERATIONS: {}", e))
            })?;
            config.max_drain_iterations = Some(limit);
        }
        if let Ok(level) = std::env::var("JOBHARNESS_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Whether to include file and line information
    pub include_location: bool,

    /// Whether to include the event target
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            include_location: false,
            include_target: true,
        }
    }
}
