//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Ably realtime relay transports (MQTT, WebSocket).
pub mod ably;

/// Configuration loading from environment, `.env` and `config.ini`.
pub mod config;

/// lemon.markets REST client.
pub mod lemon;

/// Logging setup.
pub mod telemetry;
