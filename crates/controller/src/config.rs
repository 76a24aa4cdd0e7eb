//! Controller configuration.

use std::path::Path;
use std::time::Duration;

use relevel_workqueue::RateLimiterConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for one controller, loadable from TOML.
///
/// ```toml
/// name = "SecretController"
/// workers = 4
/// resync_interval_secs = 60
///
/// [rate_limiter]
/// base_delay_ms = 5
/// max_delay_ms = 1000000
/// qps = 10.0
/// burst = 100
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller name, used for the queue, logs and events.
    pub name: String,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Seconds between periodic resyncs. Absent or zero disables them.
    pub resync_interval_secs: Option<u64>,
    /// Queue one fixed key instead of the changed objects.
    pub singleton_key: bool,
    /// Retry policy for failed items.
    pub rate_limiter: RateLimiterConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "controller".to_string(),
            workers: 1,
            resync_interval_secs: None,
            singleton_key: false,
            rate_limiter: RateLimiterConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails [`Self::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = relevel_core::parse_toml(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or fails
    /// [`Self::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = relevel_core::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty name or zero workers, and
    /// the rate limiter's own validation error otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_config("name must not be empty"));
        }
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        self.rate_limiter.validate()?;
        Ok(())
    }

    /// Resync period, if enabled.
    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
