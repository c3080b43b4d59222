//! lemon.markets Wire Types
//!
//! Response bodies of the REST endpoints and the quote record shared by the
//! REST snapshot, the MQTT payloads and the Ably message data.
//!
//! Prices arrive as integers scaled by 10,000 (`decimals=false`) and times
//! as epoch milliseconds (`epoch=true`).

use serde::{Deserialize, Serialize};

use crate::domain::quote::{Price, Quote};

/// Response of `POST /v1/auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Subscriber id, also the name of the private channel.
    pub user_id: String,
    /// Bearer token for the realtime relay.
    pub token: String,
    /// Token expiry in epoch milliseconds.
    pub expires_at: i64,
}

/// Quote as sent by lemon.markets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Instrument ISIN.
    pub isin: String,
    /// Venue MIC.
    pub mic: String,
    /// Ask price (scaled).
    pub a: i64,
    /// Bid price (scaled).
    pub b: i64,
    /// Ask volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_v: Option<i64>,
    /// Bid volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_v: Option<i64>,
    /// Quote time in epoch milliseconds.
    pub t: i64,
}

impl From<QuoteRecord> for Quote {
    fn from(record: QuoteRecord) -> Self {
        Self {
            isin: record.isin,
            mic: record.mic,
            ask: Price::from_raw(record.a),
            bid: Price::from_raw(record.b),
            ask_volume: record.a_v,
            bid_volume: record.b_v,
            timestamp_ms: record.t,
        }
    }
}

/// Response of `GET /v1/quotes/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestQuotesResponse {
    /// Latest quote per requested instrument.
    #[serde(default)]
    pub results: Vec<QuoteRecord>,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct LemonErrorResponse {
    /// Machine-readable error code.
    pub error_code: Option<String>,
    /// Human-readable description.
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_record_converts_to_domain() {
        let json = r#"{"isin":"US0378331005","mic":"XMUN","a":1502500,"b":1502450,"a_v":10,"b_v":20,"t":1660000000123}"#;
        let record: QuoteRecord = serde_json::from_str(json).unwrap();
        let quote = Quote::from(record);

        assert_eq!(quote.isin, "US0378331005");
        assert_eq!(quote.ask.to_string(), "150.2500");
        assert_eq!(quote.bid.to_string(), "150.2450");
        assert_eq!(quote.ask_volume, Some(10));
        assert_eq!(quote.timestamp_ms, 1_660_000_000_123);
    }

    #[test]
    fn volumes_are_optional() {
        let json = r#"{"isin":"DE0007164600","mic":"XMUN","a":1,"b":0,"t":1}"#;
        let record: QuoteRecord = serde_json::from_str(json).unwrap();
        assert!(record.a_v.is_none());
        assert!(record.b_v.is_none());
    }

    #[test]
    fn auth_response_parses() {
        let json = r#"{"user_id":"usr_abc","token":"tkn","expires_at":1700000000000}"#;
        let auth: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(auth.user_id, "usr_abc");
        assert_eq!(auth.expires_at, 1_700_000_000_000);
    }

    #[test]
    fn latest_quotes_without_results_is_empty() {
        let response: LatestQuotesResponse = serde_json::from_str("{}").unwrap();
        assert!(response.results.is_empty());
    }
}
