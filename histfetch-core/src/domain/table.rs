//! TickerTable: the normalized price history of one ticker.

use super::price::{Field, PriceRow};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered, date-unique price rows for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerTable {
    symbol: String,
    adjusted: bool,
    rows: Vec<PriceRow>,
}

impl TickerTable {
    /// Build a raw (unadjusted) table. Rows are sorted ascending by date;
    /// when a date repeats, the first row seen wins.
    pub fn from_rows(symbol: impl Into<String>, rows: impl IntoIterator<Item = PriceRow>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, PriceRow> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.date).or_insert(row);
        }
        Self {
            symbol: symbol.into(),
            adjusted: false,
            rows: by_date.into_values().collect(),
        }
    }

    /// Apply the adjustment policy to every row. Applying it twice is a no-op.
    pub fn adjust(self) -> Self {
        if self.adjusted {
            return self;
        }
        Self {
            symbol: self.symbol,
            adjusted: true,
            rows: self.rows.into_iter().map(PriceRow::adjust).collect(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_adjusted(&self) -> bool {
        self.adjusted
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column set of this table, in canonical order.
    pub fn columns(&self) -> &'static [Field] {
        Field::columns(self.adjusted)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.iter().map(|r| r.date)
    }

    /// One column as `(date, value)` pairs. Empty if the column is not part of this table.
    pub fn column(&self, field: Field) -> Vec<(NaiveDate, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.value(field).map(|v| (r.date, v)))
            .collect()
    }

    /// Convert to a Polars DataFrame with a `Date` column followed by this table's columns.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let epoch = NaiveDate::default();
        let dates: Vec<i32> = self
            .rows
            .iter()
            .map(|r| (r.date - epoch).num_days() as i32)
            .collect();

        let mut columns = vec![Column::new("Date".into(), dates).cast(&DataType::Date)?];
        for &field in self.columns() {
            let column = match field {
                Field::Volume => {
                    let volumes: Vec<u64> = self.rows.iter().map(|r| r.volume).collect();
                    Column::new(field.label().into(), volumes)
                }
                _ => {
                    let values: Vec<Option<f64>> =
                        self.rows.iter().map(|r| r.value(field)).collect();
                    Column::new(field.label().into(), values)
                }
            };
            columns.push(column);
        }
        DataFrame::new(columns)
    }
}
