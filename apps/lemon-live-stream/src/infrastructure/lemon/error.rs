//! lemon.markets REST error types.

use thiserror::Error;

use crate::application::ports::MarketDataError;

/// Errors from the lemon.markets REST adapter.
#[derive(Debug, Error, Clone)]
pub enum LemonError {
    /// Request could not be sent or the body could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// API key rejected.
    #[error("Authentication failed")]
    Unauthorized,

    /// API returned an error status.
    #[error("API error: {status} - {code}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Expiry timestamp outside the representable range.
    #[error("Invalid token expiry: {0}")]
    InvalidExpiry(i64),

    /// Client construction failed.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl From<LemonError> for MarketDataError {
    fn from(err: LemonError) -> Self {
        match err {
            LemonError::Unauthorized => Self::Unauthorized,
            LemonError::Network(msg) | LemonError::Config(msg) => Self::Unavailable(msg),
            LemonError::Api { .. } => Self::Unavailable(err.to_string()),
            LemonError::JsonParse(_) | LemonError::InvalidExpiry(_) => {
                Self::InvalidResponse(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_port_unauthorized() {
        let mapped: MarketDataError = LemonError::Unauthorized.into();
        assert!(matches!(mapped, MarketDataError::Unauthorized));
    }

    #[test]
    fn api_error_keeps_details() {
        let mapped: MarketDataError = LemonError::Api {
            status: 503,
            code: "service_unavailable".to_string(),
            message: "try later".to_string(),
        }
        .into();

        match mapped {
            MarketDataError::Unavailable(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("try later"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn bad_expiry_is_invalid_response() {
        let mapped: MarketDataError = LemonError::InvalidExpiry(i64::MAX).into();
        assert!(matches!(mapped, MarketDataError::InvalidResponse(_)));
    }
}
