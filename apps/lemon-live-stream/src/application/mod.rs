//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the REST API and the realtime transports.
pub mod ports;

/// Application services for token lifecycle, sessions and quote handling.
pub mod services;
