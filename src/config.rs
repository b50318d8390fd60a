//! Runtime configuration, loaded from an optional TOML file.
//!
//! A missing file yields `Config::default()`. All fields use
//! `#[serde(default)]` so any subset of keys can be specified.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tuning knobs for the refresh engine and its storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: String,

    /// Per-request fetch timeout in seconds. A fetch exceeding it fails that
    /// collection for the batch; it is not retried within the same batch.
    pub fetch_timeout_secs: u64,

    /// Maximum feeds fetched simultaneously during a batch refresh.
    pub max_concurrent_fetches: usize,

    /// Response bodies larger than this are rejected.
    pub max_feed_size_bytes: usize,

    /// User-Agent header sent with feed requests.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "roost.db".to_string(),
            fetch_timeout_secs: 30,
            max_concurrent_fetches: 10,
            max_feed_size_bytes: 10 * 1024 * 1024,
            user_agent: concat!("roost/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
