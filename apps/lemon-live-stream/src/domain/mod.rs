//! Domain Layer - Core quote, credential and handshake types.
//!
//! This layer contains the core domain types with no network
//! dependencies. Everything here is pure Rust and unit-testable.

/// Fixed-point prices, quotes and the latest-quote book.
pub mod quote;

/// Streaming credential and its refresh rule.
pub mod credential;

/// Channel attach/publish handshake sequencing.
pub mod session;
