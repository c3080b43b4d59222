//! Quote Service
//!
//! Consumes stream events, keeps the quote book current and prints every
//! quote. Once the instrument list is published it seeds the book with the
//! latest quotes from the REST API so every instrument has a value before
//! its first live update.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use tokio::sync::mpsc;

use crate::application::ports::{MarketDataPort, StreamEvent};
use crate::domain::quote::{Quote, QuoteBook};

/// Display format for quote timestamps.
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

// =============================================================================
// Quote Printer
// =============================================================================

/// Renders quotes for the console.
#[derive(Debug, Clone, Copy)]
pub struct QuotePrinter {
    timezone: Tz,
}

impl QuotePrinter {
    /// Create a printer rendering times in `timezone`.
    #[must_use]
    pub const fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Render a quote timestamp in the printer's timezone.
    ///
    /// Out-of-range timestamps fall back to the raw millisecond value.
    #[must_use]
    pub fn render_date(&self, timestamp_ms: i64) -> String {
        DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
            || timestamp_ms.to_string(),
            |ts| ts.with_timezone(&self.timezone).format(DATE_FORMAT).to_string(),
        )
    }

    /// Render a quote as a single console line.
    #[must_use]
    pub fn render(&self, quote: &Quote) -> String {
        format!(
            "{} (mic={}, ask={}, bid={}, date={})",
            quote.isin,
            quote.mic,
            quote.ask,
            quote.bid,
            self.render_date(quote.timestamp_ms)
        )
    }

    /// Log a quote at info level.
    pub fn print(&self, quote: &Quote) {
        tracing::info!("{}", self.render(quote));
    }
}

// =============================================================================
// Quote Service
// =============================================================================

/// Event consumer owning the quote book.
pub struct QuoteService<P: ?Sized> {
    book: Arc<QuoteBook>,
    market_data: Arc<P>,
    printer: QuotePrinter,
}

impl<P: MarketDataPort + ?Sized> QuoteService<P> {
    /// Create a new quote service.
    #[must_use]
    pub const fn new(book: Arc<QuoteBook>, market_data: Arc<P>, printer: QuotePrinter) -> Self {
        Self {
            book,
            market_data,
            printer,
        }
    }

    /// Shared quote book.
    #[must_use]
    pub fn book(&self) -> Arc<QuoteBook> {
        Arc::clone(&self.book)
    }

    /// Process events until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        tracing::debug!(instruments = self.book.len(), "Quote event channel closed");
    }

    /// Process a single event.
    pub async fn handle(&self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                tracing::info!("Connected to realtime relay");
            }
            StreamEvent::Attached { channel } => {
                tracing::info!(%channel, "Channel attached, publishing requested instruments");
            }
            StreamEvent::Subscribed { instruments } => {
                tracing::info!(
                    instruments = instruments.len(),
                    "Published, fetching latest quotes for initialization"
                );
                self.initialize(&instruments).await;
                tracing::info!("Initialized, waiting for live stream messages");
            }
            StreamEvent::Quote(quote) => {
                self.printer.print(&quote);
                self.book.upsert(quote);
            }
            StreamEvent::Disconnected => {
                tracing::warn!("Disconnected from realtime relay");
            }
            StreamEvent::Error(msg) => {
                tracing::error!(error = %msg, "Stream error");
            }
        }
    }

    /// Seed the book from the REST snapshot. Failures are not fatal.
    async fn initialize(&self, instruments: &[String]) {
        match self.market_data.latest_quotes(instruments).await {
            Ok(quotes) => {
                for quote in quotes {
                    let line = self.printer.render(&quote);
                    if self.book.seed(quote) {
                        tracing::info!("{line}");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch latest quotes");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MarketDataError, MockMarketDataPort};
    use crate::domain::quote::Price;

    fn quote(isin: &str, ask: i64, timestamp_ms: i64) -> Quote {
        Quote {
            isin: isin.to_string(),
            mic: "XMUN".to_string(),
            ask: Price::from_raw(ask),
            bid: Price::from_raw(ask - 50),
            ask_volume: Some(100),
            bid_volume: Some(200),
            timestamp_ms,
        }
    }

    #[test]
    fn render_line_in_utc() {
        let printer = QuotePrinter::new(Tz::UTC);
        let line = printer.render(&quote("US0378331005", 1_502_500, 1_660_000_000_123));
        assert_eq!(
            line,
            "US0378331005 (mic=XMUN, ask=150.2500, bid=150.2450, date=2022-08-08T23:06:40.123)"
        );
    }

    #[test]
    fn render_date_in_configured_timezone() {
        let printer = QuotePrinter::new(chrono_tz::Europe::Berlin);
        // 2022-08-08T23:06:40.123Z is CEST (+02:00)
        assert_eq!(
            printer.render_date(1_660_000_000_123),
            "2022-08-09T01:06:40.123"
        );
    }

    #[test]
    fn render_date_out_of_range_falls_back_to_raw() {
        let printer = QuotePrinter::new(Tz::UTC);
        assert_eq!(printer.render_date(i64::MAX), i64::MAX.to_string());
    }

    #[tokio::test]
    async fn live_quotes_update_book() {
        let service = QuoteService::new(
            Arc::new(QuoteBook::new()),
            Arc::new(MockMarketDataPort::new()),
            QuotePrinter::new(Tz::UTC),
        );

        service
            .handle(StreamEvent::Quote(quote("US0378331005", 100, 1)))
            .await;
        service
            .handle(StreamEvent::Quote(quote("US0378331005", 200, 2)))
            .await;

        let latest = service.book().get("US0378331005").unwrap();
        assert_eq!(latest.ask, Price::from_raw(200));
    }

    #[tokio::test]
    async fn subscribed_seeds_book_from_snapshot() {
        let mut market_data = MockMarketDataPort::new();
        market_data
            .expect_latest_quotes()
            .withf(|isins: &[String]| isins == ["US0378331005", "DE0007164600"])
            .times(1)
            .returning(|_| {
                Ok(vec![
                    quote("US0378331005", 1_000, 10),
                    quote("DE0007164600", 2_000, 10),
                ])
            });

        let book = Arc::new(QuoteBook::new());
        // A live quote newer than the snapshot is already present
        book.upsert(quote("US0378331005", 9_999, 20));

        let service = QuoteService::new(
            Arc::clone(&book),
            Arc::new(market_data),
            QuotePrinter::new(Tz::UTC),
        );
        service
            .handle(StreamEvent::Subscribed {
                instruments: vec!["US0378331005".to_string(), "DE0007164600".to_string()],
            })
            .await;

        assert_eq!(book.len(), 2);
        assert_eq!(book.get("US0378331005").unwrap().ask, Price::from_raw(9_999));
        assert_eq!(book.get("DE0007164600").unwrap().ask, Price::from_raw(2_000));
    }

    #[tokio::test]
    async fn snapshot_failure_is_not_fatal() {
        let mut market_data = MockMarketDataPort::new();
        market_data
            .expect_latest_quotes()
            .returning(|_| Err(MarketDataError::Unavailable("503".to_string())));

        let service = QuoteService::new(
            Arc::new(QuoteBook::new()),
            Arc::new(market_data),
            QuotePrinter::new(Tz::UTC),
        );
        service
            .handle(StreamEvent::Subscribed {
                instruments: vec!["US0378331005".to_string()],
            })
            .await;

        assert!(service.book().is_empty());
    }

    #[tokio::test]
    async fn run_drains_channel() {
        let service = QuoteService::new(
            Arc::new(QuoteBook::new()),
            Arc::new(MockMarketDataPort::new()),
            QuotePrinter::new(Tz::UTC),
        );
        let book = service.book();

        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Connected).await.unwrap();
        tx.send(StreamEvent::Quote(quote("US0378331005", 100, 1)))
            .await
            .unwrap();
        tx.send(StreamEvent::Disconnected).await.unwrap();
        drop(tx);

        service.run(rx).await;
        assert_eq!(book.len(), 1);
    }
}
