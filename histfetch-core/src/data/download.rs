//! Batch download orchestrator: two-round retry, failure report, and merge.
//!
//! Per ticker, in request order:
//!
//! 1. fetch with the cached credentials; on failure retry once immediately
//!    with force-refreshed credentials; on a second failure the ticker is
//!    `FailedRound1` and the batch moves on;
//! 2. after the first pass, credentials are force-refreshed once more and each
//!    `FailedRound1` ticker gets one last attempt; failures there are terminal
//!    (`FailedRound2`) and reported.
//!
//! A single failed ticker never aborts the batch. Only a batch with no success
//! at all is an error.

use super::combine::{CombinedTable, GroupBy};
use super::credentials::{Clock, CredentialCache, Credentials};
use super::progress::{DownloadProgress, NoProgress, ProgressBar};
use super::provider::{BatchError, DataProvider, FetchError, ProviderRegistry};
use super::throttle::Throttle;
use super::transport::{HttpTransport, ReqwestTransport};
use super::yahoo::TickerFetcher;
use crate::config::FetchConfig;
use crate::domain::{normalize_symbol, Interval, TickerTable, TimeRange};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name the downloader registers under in a [`ProviderRegistry`].
pub const PROVIDER_NAME: &str = "yahoo";

/// Where a ticker ended up within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickerState {
    Pending,
    Succeeded,
    /// Initial attempt and the immediate retry both failed.
    FailedRound1,
    /// The end-of-batch retry failed as well. Terminal.
    FailedRound2,
}

/// Per-ticker bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct TickerOutcome {
    pub symbol: String,
    pub state: TickerState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl TickerOutcome {
    fn pending(symbol: String) -> Self {
        Self {
            symbol,
            state: TickerState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// What happened to every requested ticker, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub outcomes: Vec<TickerOutcome>,
}

impl DownloadReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.with_state(TickerState::Succeeded)
    }

    /// Tickers that could not be downloaded.
    pub fn failed(&self) -> Vec<&str> {
        self.with_state(TickerState::FailedRound2)
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.state == TickerState::Succeeded)
    }

    pub fn outcome(&self, symbol: &str) -> Option<&TickerOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }

    fn with_state(&self, state: TickerState) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == state)
            .map(|o| o.symbol.as_str())
            .collect()
    }
}

/// Result data: a bare table when one ticker was requested, otherwise a combined table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PriceData {
    Single(TickerTable),
    Combined(CombinedTable),
}

impl PriceData {
    pub fn as_single(&self) -> Option<&TickerTable> {
        match self {
            PriceData::Single(t) => Some(t),
            PriceData::Combined(_) => None,
        }
    }

    pub fn as_combined(&self) -> Option<&CombinedTable> {
        match self {
            PriceData::Combined(c) => Some(c),
            PriceData::Single(_) => None,
        }
    }
}

/// A finished batch.
#[derive(Debug, Clone, Serialize)]
pub struct Download {
    pub data: PriceData,
    pub report: DownloadReport,
}

/// Options for one batch download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub range: TimeRange,
    pub interval: Interval,
    /// Apply the dividend/split adjustment policy.
    pub auto_adjust: bool,
    pub group_by: GroupBy,
    /// Date-aligned combined output (every series on the union date axis).
    pub legacy_shape: bool,
    /// Draw a progress bar on stdout.
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            range: TimeRange::default(),
            interval: Interval::default(),
            auto_adjust: false,
            group_by: GroupBy::Column,
            legacy_shape: true,
            show_progress: true,
        }
    }
}

/// Downloads price history for a list of tickers.
pub struct BatchDownloader {
    credentials: CredentialCache,
    fetcher: TickerFetcher,
    throttle: Throttle,
}

impl BatchDownloader {
    /// Downloader over a `reqwest` transport.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self::with_transport(transport, config))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: &FetchConfig) -> Self {
        Self {
            credentials: CredentialCache::new(
                transport.clone(),
                config.bootstrap_url.clone(),
                config.cookie_name.clone(),
                config.credential_ttl(),
            ),
            fetcher: TickerFetcher::new(transport, config),
            throttle: Throttle::new(config.throttle()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.credentials = self.credentials.with_clock(clock);
        self
    }

    pub fn credential_cache(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Current `(crumb, cookie)` pair.
    pub fn get_credentials(&self, force_refresh: bool) -> (String, String) {
        let creds = self.credentials.get(force_refresh);
        (creds.token, creds.session_id)
    }

    /// Register as the `yahoo` backend of a provider registry.
    pub fn register_into(self, registry: &mut ProviderRegistry) {
        if registry.register(Box::new(self)).is_some() {
            debug!(provider = PROVIDER_NAME, "replaced registered provider");
        }
    }

    /// Download every ticker, drawing a stdout progress bar when `show_progress` is set.
    pub fn download<S: AsRef<str>>(
        &self,
        tickers: &[S],
        opts: &DownloadOptions,
    ) -> Result<Download, BatchError> {
        if opts.show_progress {
            let mut bar = ProgressBar::stdout(tickers.len(), "downloaded");
            self.download_with_progress(tickers, opts, &mut bar)
        } else {
            self.download_with_progress(tickers, opts, &mut NoProgress)
        }
    }

    pub fn download_with_progress<S: AsRef<str>>(
        &self,
        tickers: &[S],
        opts: &DownloadOptions,
        progress: &mut dyn DownloadProgress,
    ) -> Result<Download, BatchError> {
        let symbols = normalize_tickers(tickers);
        if symbols.is_empty() {
            return Err(BatchError::NoTickers);
        }

        let mut outcomes: Vec<TickerOutcome> =
            symbols.iter().cloned().map(TickerOutcome::pending).collect();
        let mut tables: HashMap<String, TickerTable> = HashMap::new();

        // Round 1: cached credentials, then one immediate retry with fresh ones.
        for outcome in outcomes.iter_mut() {
            self.throttle.wait();
            let creds = self.credentials.get(false);
            let table = match self.attempt(outcome, opts, &creds) {
                Some(table) => Some(table),
                None => {
                    let creds = self.credentials.force_refresh();
                    self.attempt(outcome, opts, &creds)
                }
            };
            match table {
                Some(table) => {
                    outcome.state = TickerState::Succeeded;
                    tables.insert(outcome.symbol.clone(), table);
                    progress.advance();
                }
                None => outcome.state = TickerState::FailedRound1,
            }
        }

        // Round 2: one more attempt for each round-1 failure on freshly refreshed credentials.
        if outcomes.iter().any(|o| o.state == TickerState::FailedRound1) {
            let creds = self.credentials.force_refresh();
            for outcome in outcomes
                .iter_mut()
                .filter(|o| o.state == TickerState::FailedRound1)
            {
                self.throttle.wait();
                match self.attempt(outcome, opts, &creds) {
                    Some(table) => {
                        outcome.state = TickerState::Succeeded;
                        tables.insert(outcome.symbol.clone(), table);
                    }
                    None => outcome.state = TickerState::FailedRound2,
                }
                progress.advance();
            }
        }
        progress.finish();

        let report = DownloadReport { outcomes };
        let failed = report.failed();
        if !failed.is_empty() {
            warn!(
                tickers = %failed.join(", "),
                "the following tickers failed to download"
            );
        }
        info!(
            requested = symbols.len(),
            succeeded = tables.len(),
            failed = failed.len(),
            "batch download finished"
        );

        let mut successes: Vec<TickerTable> = symbols
            .iter()
            .filter_map(|s| tables.remove(s))
            .collect();
        if successes.is_empty() {
            return Err(BatchError::TotalFailure {
                failed: report.failed().into_iter().map(String::from).collect(),
            });
        }

        let data = if symbols.len() == 1 {
            PriceData::Single(successes.remove(0))
        } else {
            PriceData::Combined(CombinedTable::combine(
                successes,
                opts.group_by,
                opts.auto_adjust,
                opts.legacy_shape,
            ))
        };

        Ok(Download { data, report })
    }

    /// One fetch; records the attempt on the outcome.
    fn attempt(
        &self,
        outcome: &mut TickerOutcome,
        opts: &DownloadOptions,
        creds: &Credentials,
    ) -> Option<TickerTable> {
        outcome.attempts += 1;
        match self.fetcher.fetch(
            &outcome.symbol,
            opts.range,
            &opts.interval,
            opts.auto_adjust,
            creds,
        ) {
            Ok(table) => {
                debug!(symbol = %outcome.symbol, attempt = outcome.attempts, rows = table.len(), "fetched");
                Some(table)
            }
            Err(e) => {
                debug!(symbol = %outcome.symbol, attempt = outcome.attempts, error = %e, "fetch failed");
                outcome.last_error = Some(e.to_string());
                None
            }
        }
    }
}

impl DataProvider for BatchDownloader {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    /// Unadjusted daily history with the round-1 retry policy.
    fn fetch(&self, symbol: &str, range: TimeRange) -> Result<TickerTable, FetchError> {
        let interval = Interval::default();
        let creds = self.credentials.get(false);
        self.fetcher
            .fetch(symbol, range, &interval, false, &creds)
            .or_else(|_| {
                let creds = self.credentials.force_refresh();
                self.fetcher.fetch(symbol, range, &interval, false, &creds)
            })
    }
}

/// Trim, upper-case, drop blanks and duplicates (first occurrence keeps its position).
fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let symbol = normalize_symbol(ticker.as_ref());
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_are_normalized_and_deduplicated() {
        let symbols = normalize_tickers(&["spy", " qqq", "SPY", "", "iwm "]);
        assert_eq!(symbols, vec!["SPY", "QQQ", "IWM"]);
    }

    #[test]
    fn empty_request_is_rejected() {
        let downloader = BatchDownloader::new(&FetchConfig::default()).unwrap();
        let result = downloader.download_with_progress(
            &["", "  "],
            &DownloadOptions::default(),
            &mut NoProgress,
        );
        assert!(matches!(result, Err(BatchError::NoTickers)));
    }

    #[test]
    fn report_partitions_by_state() {
        let report = DownloadReport {
            outcomes: vec![
                TickerOutcome {
                    symbol: "SPY".into(),
                    state: TickerState::Succeeded,
                    attempts: 1,
                    last_error: None,
                },
                TickerOutcome {
                    symbol: "BAD".into(),
                    state: TickerState::FailedRound2,
                    attempts: 3,
                    last_error: Some("HTTP 404 for BAD".into()),
                },
            ],
        };
        assert_eq!(report.succeeded(), vec!["SPY"]);
        assert_eq!(report.failed(), vec!["BAD"]);
        assert!(!report.is_complete());
        assert_eq!(report.outcome("BAD").unwrap().attempts, 3);
    }
}
