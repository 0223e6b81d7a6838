//! histfetch core: batch download of daily price history.
//!
//! This crate contains:
//! - Domain types (price rows, per-ticker tables, time ranges)
//! - Session credential cache (crumb + cookie) with a time-to-live
//! - Single-ticker fetcher and CSV normalization with the adjustment policy
//! - Batch downloader with a two-round retry policy and failure report
//! - Combined multi-ticker table addressed by (ticker, field)
//! - Terminal progress bar

pub mod config;
pub mod data;
pub mod domain;

pub use config::{ConfigError, FetchConfig};
pub use data::{BatchDownloader, BatchError, Download, DownloadOptions, GroupBy, PriceData};
pub use domain::{Field, Interval, PriceRow, TickerTable, TimeRange};
