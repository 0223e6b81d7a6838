//! Delimited-text loader for one ticker's price history.
//!
//! Input is the CSV body of a download response: a date column followed by
//! `Open, High, Low, Close, Adj Close, Volume`. Rows with the null marker, an
//! empty cell, or an unparseable value in any column are dropped entirely.
//! A body without the expected header is an error.

use super::provider::FetchError;
use crate::domain::{Field, PriceRow, TickerTable};
use chrono::NaiveDate;
use tracing::debug;

const PRICE_FIELDS: [Field; 5] = [
    Field::Open,
    Field::High,
    Field::Low,
    Field::Close,
    Field::AdjClose,
];

/// Column positions resolved from the header row.
struct Layout {
    prices: [usize; 5],
    volume: Option<usize>,
}

impl Layout {
    fn from_headers(symbol: &str, headers: &csv::StringRecord) -> Result<Self, FetchError> {
        let position = |field: Field| {
            headers
                .iter()
                .skip(1)
                .position(|h| Field::from_label(h) == Some(field))
                .map(|i| i + 1)
        };

        let mut prices = [0; 5];
        for (slot, field) in prices.iter_mut().zip(PRICE_FIELDS) {
            *slot = position(field).ok_or_else(|| FetchError::Parse {
                symbol: symbol.to_string(),
                reason: format!("missing '{field}' column"),
            })?;
        }

        Ok(Self {
            prices,
            volume: position(Field::Volume),
        })
    }
}

/// Parse a CSV body into a table, applying the adjustment policy when `auto_adjust` is set.
pub fn parse_ticker_csv(
    symbol: &str,
    body: &str,
    null_marker: &str,
    auto_adjust: bool,
) -> Result<TickerTable, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader.headers().map_err(|e| FetchError::Parse {
        symbol: symbol.to_string(),
        reason: e.to_string(),
    })?;
    let layout = Layout::from_headers(symbol, headers)?;

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        match record.ok().and_then(|r| parse_row(&r, &layout, null_marker)) {
            Some(row) => rows.push(row),
            None => dropped += 1,
        }
    }
    debug!(symbol, kept = rows.len(), dropped, "parsed price rows");

    let table = TickerTable::from_rows(symbol, rows);
    Ok(if auto_adjust { table.adjust() } else { table })
}

fn parse_row(record: &csv::StringRecord, layout: &Layout, null_marker: &str) -> Option<PriceRow> {
    let date = NaiveDate::parse_from_str(record.get(0)?, "%Y-%m-%d").ok()?;

    let mut prices = [0.0; 5];
    for (value, &idx) in prices.iter_mut().zip(&layout.prices) {
        *value = parse_number(record.get(idx)?, null_marker)?;
    }
    let [open, high, low, close, adj_close] = prices;

    let volume = match layout.volume {
        Some(idx) => {
            let v = parse_number(record.get(idx)?, null_marker)?;
            if v < 0.0 {
                return None;
            }
            v as u64
        }
        None => 0,
    };

    Some(PriceRow {
        date,
        open,
        high,
        low,
        close,
        adj_close: Some(adj_close),
        volume,
    })
}

fn parse_number(cell: &str, null_marker: &str) -> Option<f64> {
    if cell.is_empty() || cell == null_marker {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Open,High,Low,Close,Adj Close,Volume";

    fn body(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for row in rows {
            s.push('\n');
            s.push_str(row);
        }
        s
    }

    #[test]
    fn null_rows_are_dropped() {
        let csv = body(&[
            "2020-01-02,100,105,99,104,104,1000",
            "2020-01-03,null,null,null,null,null,0",
        ]);
        let table = parse_ticker_csv("SPY", &csv, "null", false).unwrap();
        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(row.close, 104.0);
        assert_eq!(row.adj_close, Some(104.0));
        assert_eq!(row.volume, 1000);
    }

    #[test]
    fn a_single_null_cell_drops_the_row() {
        let csv = body(&[
            "2020-01-02,100,105,99,104,104,1000",
            "2020-01-03,100,105,99,104,104,null",
            "2020-01-06,100,null,99,104,104,1000",
        ]);
        let table = parse_ticker_csv("SPY", &csv, "null", false).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unparseable_cells_and_short_rows_are_dropped() {
        let csv = body(&[
            "2020-01-02,100,105,99,104,104,1000",
            "2020-01-03,abc,105,99,104,104,1000",
            "2020-01-06,100,105",
            "not-a-date,100,105,99,104,104,1000",
            "2020-01-07,100,105,99,104,104,-5",
        ]);
        let table = parse_ticker_csv("SPY", &csv, "null", false).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rows_come_out_chronological() {
        let csv = body(&[
            "2020-01-03,1,1,1,1,1,1",
            "2020-01-02,2,2,2,2,2,2",
        ]);
        let table = parse_ticker_csv("SPY", &csv, "null", false).unwrap();
        let dates: Vec<_> = table.dates().map(|d| d.to_string()).collect();
        assert_eq!(dates, vec!["2020-01-02", "2020-01-03"]);
    }

    #[test]
    fn fractional_volume_truncates() {
        let csv = body(&["2020-01-02,100,105,99,104,104,1000.0"]);
        let table = parse_ticker_csv("SPY", &csv, "null", false).unwrap();
        assert_eq!(table.rows()[0].volume, 1000);
    }

    #[test]
    fn missing_volume_column_means_zero() {
        let csv = "Date,Open,High,Low,Close,Adj Close\n2020-01-02,100,105,99,104,104";
        let table = parse_ticker_csv("SPY", csv, "null", false).unwrap();
        assert_eq!(table.rows()[0].volume, 0);
    }

    #[test]
    fn auto_adjust_rewrites_prices() {
        let csv = body(&["2020-01-02,100,110,90,100,50,1000"]);
        let table = parse_ticker_csv("SPY", &csv, "null", true).unwrap();
        assert!(table.is_adjusted());
        assert_eq!(table.columns(), &Field::ADJUSTED);
        let row = &table.rows()[0];
        assert_eq!((row.open, row.high, row.low, row.close), (50.0, 55.0, 45.0, 50.0));
    }

    #[test]
    fn error_pages_are_parse_errors() {
        let html = "<!DOCTYPE html><html><body>Not Found</body></html>";
        assert!(matches!(
            parse_ticker_csv("SPY", html, "null", false),
            Err(FetchError::Parse { .. })
        ));

        let json = r#"{"finance":{"error":{"code":"Unauthorized","description":"Invalid cookie"}}}"#;
        assert!(parse_ticker_csv("SPY", json, "null", false).is_err());
        assert!(parse_ticker_csv("SPY", "", "null", false).is_err());
    }

    #[test]
    fn header_only_body_is_an_empty_table() {
        let table = parse_ticker_csv("SPY", HEADER, "null", false).unwrap();
        assert!(table.is_empty());
    }
}
