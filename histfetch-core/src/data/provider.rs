//! Data provider trait, provider registry, and structured error types.
//!
//! The DataProvider trait lets the downloader be registered as the backend of
//! some larger data-access layer under a provider name. Nothing in this crate
//! requires a registry; it is an optional integration point.

use crate::domain::{TickerTable, TimeRange};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure of a single ticker fetch. Contained by the batch downloader and
/// turned into retry bookkeeping; never returned from a batch download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {symbol}")]
    Http { symbol: String, status: u16 },

    #[error("unparseable response for {symbol}: {reason}")]
    Parse { symbol: String, reason: String },

    #[error("HTTP client setup failed: {0}")]
    Transport(String),
}

/// Hard failures of a batch download.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no tickers requested")]
    NoTickers,

    #[error("no ticker could be downloaded (failed: {})", .failed.join(", "))]
    TotalFailure { failed: Vec<String> },
}

/// Trait for price-history providers.
pub trait DataProvider: Send + Sync {
    /// Name the provider is registered under.
    fn name(&self) -> &str;

    /// Fetch daily price history for one symbol.
    fn fetch(&self, symbol: &str, range: TimeRange) -> Result<TickerTable, FetchError>;

    /// Whether the provider can currently serve requests.
    fn is_available(&self) -> bool {
        true
    }
}

/// Providers keyed by name. Registering a name twice replaces the earlier provider.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Box<dyn DataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, returning the one it replaced.
    pub fn register(&mut self, provider: Box<dyn DataProvider>) -> Option<Box<dyn DataProvider>> {
        self.providers.insert(provider.name().to_string(), provider)
    }

    pub fn get(&self, name: &str) -> Option<&dyn DataProvider> {
        self.providers.get(name).map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|n| n.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
