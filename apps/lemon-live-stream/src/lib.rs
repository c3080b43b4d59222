#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! lemon.markets Live Stream Client
//!
//! Fetches a streaming token from the lemon.markets realtime API, connects
//! to the Ably relay over MQTT or WebSocket, subscribes to a fixed list of
//! instruments and logs every incoming quote.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `quote`: Fixed-point prices, quotes and the latest-quote book
//!   - `credential`: Streaming token and its one-hour refresh margin
//!   - `session`: Attach/publish handshake sequencing
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: REST market data and realtime transport interfaces
//!   - `services`: Token guard, stream session, quote service
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `lemon`: REST client for credentials and quote snapshots
//!   - `ably`: MQTT and WebSocket transports, frame codec
//!   - `config`: Environment, `.env` and `config.ini` loading
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//! POST /v1/auth ──► TokenGuard ──► StreamSession ──► MQTT / WebSocket
//!                                                        │
//!                                                   StreamEvent
//!                                                        ▼
//! GET /v1/quotes/latest ─────────────────────────► QuoteService ──► QuoteBook + log
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core quote and handshake types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::credential::{Credential, REFRESH_MARGIN};
pub use domain::quote::{Price, Quote, QuoteBook};
pub use domain::session::{ChannelSequencer, HandshakeCommand, HandshakeState};

// Ports and services
pub use application::ports::{
    MarketDataError, MarketDataPort, StreamEvent, StreamTransport, TransportError,
};
pub use application::services::{
    QuotePrinter, QuoteService, SessionError, StreamSession, TokenGuard,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, LogLevel, StreamConfig, TransportKind};

// Adapters
pub use infrastructure::ably::{
    FrameFormat, MqttTransport, MqttTransportConfig, WebSocketTransport,
    WebSocketTransportConfig,
};
pub use infrastructure::lemon::{LemonClient, LemonClientConfig, LemonError};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
