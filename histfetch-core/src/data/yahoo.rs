//! Yahoo Finance CSV download endpoint.
//!
//! One authenticated GET per ticker: the crumb goes in the query string and the
//! session cookie in the request headers. The body is the CSV history handled by
//! [`parse_ticker_csv`](super::parse::parse_ticker_csv).
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::credentials::Credentials;
use super::parse::parse_ticker_csv;
use super::provider::FetchError;
use super::transport::HttpTransport;
use crate::config::FetchConfig;
use crate::domain::{normalize_symbol, Interval, TickerTable, TimeRange};
use reqwest::Url;
use std::sync::Arc;
use tracing::debug;

/// Fetches and normalizes one ticker's history.
pub struct TickerFetcher {
    transport: Arc<dyn HttpTransport>,
    download_url: String,
    cookie_name: String,
    null_marker: String,
}

impl TickerFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &FetchConfig) -> Self {
        Self {
            transport,
            download_url: config.download_url.clone(),
            cookie_name: config.cookie_name.clone(),
            null_marker: config.null_marker.clone(),
        }
    }

    /// Build the download URL for a symbol, range, interval and crumb.
    pub fn download_url(
        &self,
        symbol: &str,
        range: TimeRange,
        interval: &Interval,
        token: &str,
    ) -> Result<Url, FetchError> {
        let invalid = || FetchError::Transport(format!("invalid download URL: {}", self.download_url));

        let mut url = Url::parse(&self.download_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("period1", &range.period1().to_string())
            .append_pair("period2", &range.period2().to_string())
            .append_pair("interval", interval.as_str())
            .append_pair("events", "history")
            .append_pair("crumb", token);
        Ok(url)
    }

    /// Download one ticker. The symbol is upper-cased before use.
    pub fn fetch(
        &self,
        ticker: &str,
        range: TimeRange,
        interval: &Interval,
        auto_adjust: bool,
        credentials: &Credentials,
    ) -> Result<TickerTable, FetchError> {
        let symbol = normalize_symbol(ticker);
        let url = self.download_url(&symbol, range, interval, &credentials.token)?;
        debug!(symbol = %symbol, period1 = range.period1(), period2 = range.period2(), "fetching history");

        let resp = self.transport.get(
            url.as_str(),
            &[(self.cookie_name.as_str(), credentials.session_id.as_str())],
        )?;
        if !resp.is_success() {
            return Err(FetchError::Http {
                symbol,
                status: resp.status,
            });
        }

        parse_ticker_csv(&symbol, &resp.body, &self.null_marker, auto_adjust)
    }
}
