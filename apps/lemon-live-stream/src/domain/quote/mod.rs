//! Quote Types
//!
//! Core domain types for live quotes: fixed-point prices, the quote itself
//! and the in-memory book holding the latest quote per instrument.
//!
//! # Design
//!
//! Prices arrive as integers scaled by 10,000 (`decimals=false` on the
//! lemon.markets API) and are kept that way. Conversion to a decimal only
//! happens for display, so no floating point is involved at any stage.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

// =============================================================================
// Price
// =============================================================================

/// Number of implied decimal places in a raw price.
pub const PRICE_SCALE: u32 = 4;

/// Fixed-point price, integer scaled by 10,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(i64);

impl Price {
    /// Create a price from its raw scaled representation.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw scaled value.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Price as a decimal with exactly four fractional digits.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, PRICE_SCALE)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// =============================================================================
// Quote
// =============================================================================

/// A single top-of-book quote for one instrument on one venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    /// Instrument identifier (ISIN).
    pub isin: String,
    /// Market identifier code of the venue.
    pub mic: String,
    /// Best ask price.
    pub ask: Price,
    /// Best bid price.
    pub bid: Price,
    /// Volume at the ask, if reported.
    pub ask_volume: Option<i64>,
    /// Volume at the bid, if reported.
    pub bid_volume: Option<i64>,
    /// Quote time in epoch milliseconds.
    pub timestamp_ms: i64,
}

impl Quote {
    /// Quote time as a UTC instant.
    ///
    /// Returns `None` if the millisecond value is out of range.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

// =============================================================================
// Quote Book
// =============================================================================

/// Latest quote per instrument.
///
/// Live updates are last-write-wins in arrival order. Snapshot data from
/// the REST API goes through [`QuoteBook::seed`], which never replaces a
/// quote that is already newer.
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: RwLock<HashMap<String, Quote>>,
}

impl QuoteBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a live quote, returning the quote it replaced.
    pub fn upsert(&self, quote: Quote) -> Option<Quote> {
        self.quotes.write().insert(quote.isin.clone(), quote)
    }

    /// Store a snapshot quote unless a newer one is already present.
    ///
    /// Returns `true` if the quote was stored.
    pub fn seed(&self, quote: Quote) -> bool {
        let mut quotes = self.quotes.write();
        match quotes.get(&quote.isin) {
            Some(existing) if existing.timestamp_ms > quote.timestamp_ms => false,
            _ => {
                quotes.insert(quote.isin.clone(), quote);
                true
            }
        }
    }

    /// Latest quote for an instrument.
    #[must_use]
    pub fn get(&self, isin: &str) -> Option<Quote> {
        self.quotes.read().get(isin).cloned()
    }

    /// Number of instruments with a quote.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    /// Check if the book is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }

    /// All quotes, ordered by ISIN.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.quotes.read().values().cloned().collect();
        quotes.sort_by(|a, b| a.isin.cmp(&b.isin));
        quotes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn quote(isin: &str, ask: i64, timestamp_ms: i64) -> Quote {
        Quote {
            isin: isin.to_string(),
            mic: "XMUN".to_string(),
            ask: Price::from_raw(ask),
            bid: Price::from_raw(ask - 100),
            ask_volume: None,
            bid_volume: None,
            timestamp_ms,
        }
    }

    #[test_case(1_234_567, "123.4567" ; "regular price")]
    #[test_case(10_000, "1.0000" ; "whole number keeps four decimals")]
    #[test_case(5, "0.0005" ; "sub cent")]
    #[test_case(0, "0.0000" ; "zero")]
    #[test_case(-12_500, "-1.2500" ; "negative")]
    fn price_renders_four_decimals(raw: i64, expected: &str) {
        assert_eq!(Price::from_raw(raw).to_string(), expected);
    }

    #[test]
    fn price_to_decimal_divides_by_ten_thousand() {
        let price = Price::from_raw(1_500_000);
        assert_eq!(price.to_decimal(), Decimal::from(150));
        assert_eq!(price.raw(), 1_500_000);
    }

    #[test]
    fn quote_timestamp_from_epoch_millis() {
        let q = quote("US0378331005", 1_500_000, 1_660_000_000_123);
        let ts = q.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_660_000_000_123);
    }

    #[test]
    fn book_last_write_wins() {
        let book = QuoteBook::new();
        assert!(book.upsert(quote("US0378331005", 100, 2_000)).is_none());

        let replaced = book.upsert(quote("US0378331005", 200, 1_000));
        assert_eq!(replaced.unwrap().ask, Price::from_raw(100));

        // Arrival order wins, not timestamp order
        let latest = book.get("US0378331005").unwrap();
        assert_eq!(latest.ask, Price::from_raw(200));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn book_keeps_instruments_apart() {
        let book = QuoteBook::new();
        book.upsert(quote("US0378331005", 100, 1));
        book.upsert(quote("DE0007164600", 200, 1));

        assert_eq!(book.len(), 2);
        let isins: Vec<String> = book.snapshot().into_iter().map(|q| q.isin).collect();
        assert_eq!(isins, vec!["DE0007164600", "US0378331005"]);
    }

    #[test]
    fn seed_does_not_overwrite_newer_quote() {
        let book = QuoteBook::new();
        book.upsert(quote("US0378331005", 300, 5_000));

        assert!(!book.seed(quote("US0378331005", 100, 4_000)));
        assert_eq!(book.get("US0378331005").unwrap().ask, Price::from_raw(300));

        assert!(book.seed(quote("US0378331005", 400, 6_000)));
        assert_eq!(book.get("US0378331005").unwrap().ask, Price::from_raw(400));
    }

    #[test]
    fn seed_into_empty_book() {
        let book = QuoteBook::new();
        assert!(book.is_empty());
        assert!(book.seed(quote("US0378331005", 100, 1)));
        assert!(!book.is_empty());
    }
}
