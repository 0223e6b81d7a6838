//! Multi-ticker combined table.
//!
//! Per-ticker tables are merged into one mapping from `(ticker, field)` to an
//! ordered series. The outer grouping axis only changes iteration order and the
//! nesting of serialized output; lookups by ticker and field work either way.
//!
//! In the aligned (legacy) shape every series is reindexed onto the union of
//! all tickers' dates, with `None` where a ticker has no row. Otherwise each
//! series carries exactly its own ticker's rows.

use crate::domain::{Field, TickerTable};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Outer axis of a combined table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Field first, then ticker: `Close.SPY`, `Close.QQQ`, `Volume.SPY`, ...
    #[default]
    Column,
    /// Ticker first, then field: `SPY.Open`, `SPY.High`, ...
    Ticker,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "column" => Ok(GroupBy::Column),
            "ticker" => Ok(GroupBy::Ticker),
            other => Err(format!("unknown group-by '{other}' (expected 'column' or 'ticker')")),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Column => f.write_str("column"),
            GroupBy::Ticker => f.write_str("ticker"),
        }
    }
}

/// One observation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Address of one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub ticker: String,
    pub field: Field,
}

impl SeriesKey {
    /// `(outer, inner)` labels under a grouping.
    pub fn labels(&self, group_by: GroupBy) -> (String, String) {
        match group_by {
            GroupBy::Column => (self.field.label().to_string(), self.ticker.clone()),
            GroupBy::Ticker => (self.ticker.clone(), self.field.label().to_string()),
        }
    }

    /// Flat column name `outer.inner`.
    pub fn column_name(&self, group_by: GroupBy) -> String {
        let (outer, inner) = self.labels(group_by);
        format!("{outer}.{inner}")
    }
}

/// Mapping from `(ticker, field)` to an ordered series.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    group_by: GroupBy,
    aligned: bool,
    fields: Vec<Field>,
    tickers: Vec<String>,
    series: HashMap<SeriesKey, Vec<Point>>,
}

impl CombinedTable {
    /// Merge tables, keeping their order on the ticker axis.
    ///
    /// The field axis is `{Open, High, Low, Close, Volume}` when `adjusted`,
    /// otherwise `{Open, High, Low, Close, Adj Close, Volume}`.
    pub fn combine(
        tables: Vec<TickerTable>,
        group_by: GroupBy,
        adjusted: bool,
        aligned: bool,
    ) -> Self {
        let fields = Field::columns(adjusted).to_vec();
        let axis: Option<Vec<NaiveDate>> = aligned.then(|| {
            tables
                .iter()
                .flat_map(|t| t.dates())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        });

        let mut tickers = Vec::with_capacity(tables.len());
        let mut series = HashMap::new();
        for table in &tables {
            tickers.push(table.symbol().to_string());
            let by_date: HashMap<NaiveDate, usize> = table
                .rows()
                .iter()
                .enumerate()
                .map(|(i, r)| (r.date, i))
                .collect();

            for &field in &fields {
                let points: Vec<Point> = match &axis {
                    Some(dates) => dates
                        .iter()
                        .map(|&date| Point {
                            date,
                            value: by_date
                                .get(&date)
                                .and_then(|&i| table.rows()[i].value(field)),
                        })
                        .collect(),
                    None => table
                        .column(field)
                        .into_iter()
                        .map(|(date, v)| Point {
                            date,
                            value: Some(v),
                        })
                        .collect(),
                };
                series.insert(
                    SeriesKey {
                        ticker: table.symbol().to_string(),
                        field,
                    },
                    points,
                );
            }
        }

        Self {
            group_by,
            aligned,
            fields,
            tickers,
            series,
        }
    }

    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn contains_ticker(&self, ticker: &str) -> bool {
        self.tickers.iter().any(|t| t == ticker)
    }

    pub fn get(&self, ticker: &str, field: Field) -> Option<&[Point]> {
        self.series
            .get(&SeriesKey {
                ticker: ticker.to_string(),
                field,
            })
            .map(|v| v.as_slice())
    }

    /// Re-group the same data along the other axis.
    pub fn regroup(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    /// Every series key, in grouping order.
    pub fn keys(&self) -> Vec<SeriesKey> {
        let key = |ticker: &String, field: Field| SeriesKey {
            ticker: ticker.clone(),
            field,
        };
        match self.group_by {
            GroupBy::Column => self
                .fields
                .iter()
                .flat_map(|&f| self.tickers.iter().map(move |t| key(t, f)))
                .collect(),
            GroupBy::Ticker => self
                .tickers
                .iter()
                .flat_map(|t| self.fields.iter().map(move |&f| key(t, f)))
                .collect(),
        }
    }

    /// Labels of the outer axis, in order.
    pub fn outer_keys(&self) -> Vec<String> {
        match self.group_by {
            GroupBy::Column => self.fields.iter().map(|f| f.label().to_string()).collect(),
            GroupBy::Ticker => self.tickers.clone(),
        }
    }

    /// Union of all dates across every series, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.series
            .values()
            .flat_map(|points| points.iter().map(|p| p.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Wide view over the union date axis: one row per date, one cell per key in
    /// grouping order, `None` where the series has no value on that date.
    pub fn wide_rows(&self) -> (Vec<SeriesKey>, Vec<(NaiveDate, Vec<Option<f64>>)>) {
        let keys = self.keys();
        let lookups: Vec<HashMap<NaiveDate, Option<f64>>> = keys
            .iter()
            .map(|k| {
                self.series
                    .get(k)
                    .map(|points| points.iter().map(|p| (p.date, p.value)).collect())
                    .unwrap_or_default()
            })
            .collect();

        let rows = self
            .dates()
            .into_iter()
            .map(|date| {
                let cells = lookups
                    .iter()
                    .map(|l| l.get(&date).copied().flatten())
                    .collect();
                (date, cells)
            })
            .collect();
        (keys, rows)
    }

    /// Convert to a Polars DataFrame: a `Date` column plus one `outer.inner` column per key.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let (keys, rows) = self.wide_rows();
        let epoch = NaiveDate::default();

        let dates: Vec<i32> = rows
            .iter()
            .map(|(d, _)| (*d - epoch).num_days() as i32)
            .collect();
        let mut columns = vec![Column::new("Date".into(), dates).cast(&DataType::Date)?];
        for (i, key) in keys.iter().enumerate() {
            let values: Vec<Option<f64>> = rows.iter().map(|(_, cells)| cells[i]).collect();
            columns.push(Column::new(key.column_name(self.group_by).into(), values));
        }
        DataFrame::new(columns)
    }
}

/// Nested serialization: `{ outer: { inner: [points] } }` in grouping order.
impl Serialize for CombinedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let keys = self.keys();
        let outer_keys = self.outer_keys();
        let mut map = serializer.serialize_map(Some(outer_keys.len()))?;
        for outer in &outer_keys {
            let inner: Vec<(String, &[Point])> = keys
                .iter()
                .filter_map(|k| {
                    let (o, i) = k.labels(self.group_by);
                    if &o != outer {
                        return None;
                    }
                    self.series.get(k).map(|points| (i, points.as_slice()))
                })
                .collect();
            map.serialize_entry(outer, &InnerGroup(&inner))?;
        }
        map.end()
    }
}

struct InnerGroup<'a>(&'a [(String, &'a [Point])]);

impl Serialize for InnerGroup<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, points) in self.0 {
            map.serialize_entry(label, points)?;
        }
        map.end()
    }
}
