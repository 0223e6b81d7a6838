//! Fetch configuration, loadable from TOML.
//!
//! Every key is optional; missing keys take the defaults below. Named
//! watchlists are a convenience for selecting groups of tickers:
//!
//! ```toml
//! credential_ttl_secs = 120
//!
//! [watchlists]
//! etfs = ["SPY", "QQQ", "IWM"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown watchlist '{0}'")]
    UnknownWatchlist(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// History page of a liquid reference ticker; sets the session cookie and embeds the crumb.
    pub bootstrap_url: String,
    /// Download endpoint; the ticker is appended as a path segment.
    pub download_url: String,
    pub cookie_name: String,
    pub credential_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Minimum gap between ticker requests.
    pub throttle_ms: u64,
    /// Literal the source uses for missing values.
    pub null_marker: String,
    pub watchlists: BTreeMap<String, Vec<String>>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "https://finance.yahoo.com/quote/SPY/history".into(),
            download_url: "https://query1.finance.yahoo.com/v7/finance/download".into(),
            cookie_name: "B".into(),
            credential_ttl_secs: 180,
            request_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
            throttle_ms: 1,
            null_marker: "null".into(),
            watchlists: BTreeMap::new(),
        }
    }
}

impl FetchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn watchlist(&self, name: &str) -> Result<&[String], ConfigError> {
        self.watchlists
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| ConfigError::UnknownWatchlist(name.to_string()))
    }
}
