//! Request parameters: the calendar range and the bar interval.

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const SECONDS_PER_DAY: i64 = 86_400;

/// Inclusive calendar bounds of a download.
///
/// `start <= end` is assumed, not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fill absent bounds: start defaults to 1950-01-01, end to today (UTC).
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start: start.unwrap_or_else(Self::default_start),
            end: end.unwrap_or_else(|| Utc::now().date_naive()),
        }
    }

    pub fn default_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(1950, 1, 1).unwrap_or_default()
    }

    /// Start of the first day, as Unix seconds.
    pub fn period1(&self) -> i64 {
        self.start.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// Last second of the final day, as Unix seconds.
    pub fn period2(&self) -> i64 {
        self.end.and_time(NaiveTime::MIN).and_utc().timestamp() + SECONDS_PER_DAY - 1
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::from_bounds(None, None)
    }
}

/// Bar interval code passed through to the data source (`1d`, `1wk`, `1mo`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval(String);

impl Interval {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self("1d".into())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
