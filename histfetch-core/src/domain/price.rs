//! PriceRow: one trading day of price history for a single ticker.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A column of price history.
///
/// The declaration order is the canonical column order of every table and of
/// the field axis of a combined table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Open,
    High,
    Low,
    Close,
    #[serde(rename = "Adj Close")]
    AdjClose,
    Volume,
}

impl Field {
    /// Columns of an unadjusted table.
    pub const RAW: [Field; 6] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::AdjClose,
        Field::Volume,
    ];

    /// Columns of an adjusted table. The adjusted close replaces `Close`.
    pub const ADJUSTED: [Field; 5] = [
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    /// The column set for a table with or without the adjustment policy applied.
    pub fn columns(adjusted: bool) -> &'static [Field] {
        if adjusted {
            &Self::ADJUSTED
        } else {
            &Self::RAW
        }
    }

    /// Header label as it appears in the source CSV.
    pub fn label(self) -> &'static str {
        match self {
            Field::Open => "Open",
            Field::High => "High",
            Field::Low => "Low",
            Field::Close => "Close",
            Field::AdjClose => "Adj Close",
            Field::Volume => "Volume",
        }
    }

    /// Parse a CSV header label (case-insensitive, surrounding whitespace ignored).
    pub fn from_label(label: &str) -> Option<Field> {
        let label = label.trim();
        Self::RAW
            .iter()
            .copied()
            .find(|f| f.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Daily OHLCV row.
///
/// `adj_close` is `Some` on raw rows and `None` once the adjustment policy has
/// folded it into `close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
    pub volume: u64,
}

impl PriceRow {
    /// Value of one column. `None` only for `AdjClose` on an adjusted row.
    pub fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Open => Some(self.open),
            Field::High => Some(self.high),
            Field::Low => Some(self.low),
            Field::Close => Some(self.close),
            Field::AdjClose => self.adj_close,
            Field::Volume => Some(self.volume as f64),
        }
    }

    /// Rewrite OHLC to reflect dividends and splits.
    ///
    /// `ratio = close / adj_close`; open/high/low are divided by it and the
    /// adjusted close becomes the close. Rows already adjusted are returned as-is.
    pub fn adjust(self) -> PriceRow {
        let Some(adj_close) = self.adj_close else {
            return self;
        };
        let ratio = self.close / adj_close;
        PriceRow {
            date: self.date,
            open: self.open / ratio,
            high: self.high / ratio,
            low: self.low / ratio,
            close: adj_close,
            adj_close: None,
            volume: self.volume,
        }
    }
}
