//! lemon.markets REST client.
//!
//! Fetches streaming credentials from the realtime API and the latest
//! quotes from the market data API. There is no retry: every failure is
//! returned to the caller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::error::LemonError;
use super::messages::{AuthResponse, LatestQuotesResponse, LemonErrorResponse};
use crate::application::ports::{MarketDataError, MarketDataPort};
use crate::domain::credential::Credential;
use crate::domain::quote::Quote;

/// Production realtime API.
pub const REALTIME_BASE_URL: &str = "https://realtime.lemon.markets";

/// Production market data API.
pub const DATA_BASE_URL: &str = "https://data.lemon.markets";

/// Maximum ISINs per latest-quotes request.
pub const MAX_ISINS_PER_REQUEST: usize = 10;

/// REST client settings.
#[derive(Debug, Clone)]
pub struct LemonClientConfig {
    /// Base URL of the realtime API.
    pub realtime_base_url: String,
    /// Base URL of the market data API.
    pub data_base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for LemonClientConfig {
    fn default() -> Self {
        Self {
            realtime_base_url: REALTIME_BASE_URL.to_string(),
            data_base_url: DATA_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the lemon.markets APIs.
#[derive(Clone)]
pub struct LemonClient {
    client: Client,
    api_key: String,
    realtime_base_url: String,
    data_base_url: String,
}

impl std::fmt::Debug for LemonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LemonClient")
            .field("api_key", &"[REDACTED]")
            .field("realtime_base_url", &self.realtime_base_url)
            .field("data_base_url", &self.data_base_url)
            .finish_non_exhaustive()
    }
}

impl LemonClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or the HTTP client cannot
    /// be built.
    pub fn new(api_key: impl Into<String>, config: &LemonClientConfig) -> Result<Self, LemonError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LemonError::Unauthorized);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LemonError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            realtime_base_url: config.realtime_base_url.trim_end_matches('/').to_string(),
            data_base_url: config.data_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Request a streaming credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the key is rejected or the
    /// expiry cannot be represented.
    pub async fn fetch_credential(&self) -> Result<Credential, LemonError> {
        let request = self
            .client
            .post(format!("{}/v1/auth", self.realtime_base_url))
            .json(&serde_json::json!({}));
        let auth: AuthResponse = self.send(request).await?;

        let expires_at = DateTime::from_timestamp_millis(auth.expires_at)
            .ok_or(LemonError::InvalidExpiry(auth.expires_at))?;

        Ok(Credential::new(auth.user_id, auth.token, expires_at))
    }

    /// Fetch the latest quote for each ISIN, in chunks of
    /// [`MAX_ISINS_PER_REQUEST`].
    ///
    /// # Errors
    ///
    /// Returns the first failing chunk's error.
    pub async fn fetch_latest_quotes(&self, isins: &[String]) -> Result<Vec<Quote>, LemonError> {
        let mut quotes = Vec::with_capacity(isins.len());

        for chunk in isins.chunks(MAX_ISINS_PER_REQUEST) {
            let request = self
                .client
                .get(format!("{}/v1/quotes/latest", self.data_base_url))
                .query(&[
                    ("isin", chunk.join(",").as_str()),
                    ("epoch", "true"),
                    ("decimals", "false"),
                ]);
            let response: LatestQuotesResponse = self.send(request).await?;

            tracing::debug!(
                requested = chunk.len(),
                received = response.results.len(),
                "Fetched latest quotes"
            );
            quotes.extend(response.results.into_iter().map(Quote::from));
        }

        Ok(quotes)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LemonError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| LemonError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LemonError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| LemonError::JsonParse(e.to_string()));
        }

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(LemonError::Unauthorized);
        }

        let (code, message) = match serde_json::from_str::<LemonErrorResponse>(&body) {
            Ok(err) => (
                err.error_code.unwrap_or_else(|| status.as_u16().to_string()),
                err.error_message.unwrap_or_default(),
            ),
            Err(_) => (status.as_u16().to_string(), body),
        };

        Err(LemonError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl MarketDataPort for LemonClient {
    async fn authenticate(&self) -> Result<Credential, MarketDataError> {
        Ok(self.fetch_credential().await?)
    }

    async fn latest_quotes(&self, isins: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        Ok(self.fetch_latest_quotes(isins).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> LemonClient {
        let config = LemonClientConfig {
            realtime_base_url: server.uri(),
            data_base_url: server.uri(),
            timeout: Duration::from_secs(5),
        };
        LemonClient::new("test-key", &config).unwrap()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = LemonClient::new("", &LemonClientConfig::default());
        assert!(matches!(result, Err(LemonError::Unauthorized)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = LemonClient::new("secret-key", &LemonClientConfig::default()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn fetch_credential_posts_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_id": "usr_abc",
                "token": "tkn_123",
                "expires_at": 1_700_000_000_000_i64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = client_for(&server).await.fetch_credential().await.unwrap();
        assert_eq!(credential.user_id(), "usr_abc");
        assert_eq!(credential.token(), "tkn_123");
        assert_eq!(credential.expires_at().timestamp_millis(), 1_700_000_000_000);
    }

    #[tokio::test]
    async fn unauthorized_status_maps_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch_credential().await.unwrap_err();
        assert!(matches!(err, LemonError::Unauthorized));
    }

    #[tokio::test]
    async fn api_error_body_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "status": "error",
                "error_code": "internal_error",
                "error_message": "something broke"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch_credential().await.unwrap_err();
        match err {
            LemonError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 500);
                assert_eq!(code, "internal_error");
                assert_eq!(message, "something broke");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.fetch_credential().await.unwrap_err();
        assert!(matches!(err, LemonError::JsonParse(_)));
    }

    #[tokio::test]
    async fn latest_quotes_are_chunked() {
        let server = MockServer::start().await;
        let isins: Vec<String> = (0..12).map(|i| format!("DE00000000{i:02}")).collect();

        Mock::given(method("GET"))
            .and(path("/v1/quotes/latest"))
            .and(query_param("isin", isins[..10].join(",")))
            .and(query_param("epoch", "true"))
            .and(query_param("decimals", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"isin": "DE0000000000", "mic": "XMUN", "a": 10_000, "b": 9_000, "t": 1}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/quotes/latest"))
            .and(query_param("isin", isins[10..].join(",")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"isin": "DE0000000011", "mic": "XMUN", "a": 20_000, "b": 19_000, "a_v": 5, "b_v": 7, "t": 2}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let quotes = client_for(&server)
            .await
            .fetch_latest_quotes(&isins)
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].ask.to_string(), "1.0000");
        assert_eq!(quotes[1].isin, "DE0000000011");
        assert_eq!(quotes[1].bid_volume, Some(7));
    }

    #[tokio::test]
    async fn no_isins_sends_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let quotes = client_for(&server).await.fetch_latest_quotes(&[]).await.unwrap();
        assert!(quotes.is_empty());
    }
}
