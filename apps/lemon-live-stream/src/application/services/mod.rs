//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TokenGuard`: keeps a valid streaming credential at hand
//! - `QuoteService`: consumes stream events into the quote book
//! - `StreamSession`: runs the transport and rotates expiring tokens

pub mod quote_service;
pub mod session;
pub mod token_guard;

pub use quote_service::{QuotePrinter, QuoteService};
pub use session::{MIN_ROTATION_DELAY, SessionError, StreamSession};
pub use token_guard::TokenGuard;
