//! lemon.markets REST Adapter
//!
//! Implements [`MarketDataPort`](crate::application::ports::MarketDataPort)
//! against the realtime auth endpoint and the latest-quotes endpoint.

mod client;
mod error;
pub mod messages;

pub use client::{
    DATA_BASE_URL, LemonClient, LemonClientConfig, MAX_ISINS_PER_REQUEST, REALTIME_BASE_URL,
};
pub use error::LemonError;
pub use messages::QuoteRecord;
