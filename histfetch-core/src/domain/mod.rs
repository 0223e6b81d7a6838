//! Domain types for histfetch

pub mod price;
pub mod range;
pub mod table;

pub use price::{Field, PriceRow};
pub use range::{Interval, TimeRange};
pub use table::TickerTable;

/// Symbol type alias
pub type Symbol = String;

/// Normalize a ticker symbol: trim surrounding whitespace and upper-case.
pub fn normalize_symbol(symbol: &str) -> Symbol {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" spy "), "SPY");
        assert_eq!(normalize_symbol("brk-b"), "BRK-B");
        assert_eq!(normalize_symbol("^gspc"), "^GSPC");
    }
}
