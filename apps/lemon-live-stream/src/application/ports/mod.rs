//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MarketDataPort`: REST access for credentials and quote snapshots
//! - `StreamTransport`: realtime connection to the relay (MQTT or WebSocket)

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::credential::Credential;
use crate::domain::quote::Quote;

// =============================================================================
// Market Data Port
// =============================================================================

/// Market data REST errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketDataError {
    /// API key rejected.
    #[error("unauthorized: API key was rejected")]
    Unauthorized,

    /// Endpoint unreachable or returned an error status.
    #[error("market data API unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted.
    #[error("invalid market data response: {0}")]
    InvalidResponse(String),
}

/// REST side of the market data provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Fetch a fresh streaming credential.
    async fn authenticate(&self) -> Result<Credential, MarketDataError>;

    /// Fetch the latest quote for each instrument.
    async fn latest_quotes(&self, isins: &[String]) -> Result<Vec<Quote>, MarketDataError>;
}

// =============================================================================
// Stream Transport Port
// =============================================================================

/// Events emitted by a stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Connection to the relay is up.
    Connected,
    /// Private channel attached.
    Attached {
        /// Channel name.
        channel: String,
    },
    /// Instrument list published; quotes follow.
    Subscribed {
        /// Published instruments.
        instruments: Vec<String>,
    },
    /// Received a quote.
    Quote(Quote),
    /// Connection closed.
    Disconnected,
    /// Non-fatal problem worth surfacing.
    Error(String),
}

/// Realtime transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not establish or keep the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Relay refused a request.
    #[error("rejected by relay ({code}): {message}")]
    Rejected {
        /// Error code reported by the relay.
        code: i64,
        /// Error description.
        message: String,
    },

    /// Frame encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {0}")]
    Config(String),
}

/// A realtime connection to the quote relay.
///
/// `run` performs one connection: it drives the handshake, emits events
/// and returns when the relay closes the connection (`Ok`), when `cancel`
/// fires (`Ok`, after a graceful close) or on the first error.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Run a single connection until closed, cancelled or failed.
    async fn run(
        &self,
        credential: &Credential,
        instruments: &[String],
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}
