//! Token Lifecycle Guard
//!
//! Hands out the current streaming credential and replaces it before it
//! goes stale. There is no retry: a failed fetch is returned to the caller
//! and ends the session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::application::ports::{MarketDataError, MarketDataPort};
use crate::domain::credential::Credential;

/// Display format of token expiry times.
const EXPIRY_FORMAT: &str = "%d.%m.%Y %H:%M:%S %Z%z";

/// Render `expires_at` in `timezone` for log output.
fn local_expiry(expires_at: DateTime<Utc>, timezone: Tz) -> String {
    expires_at
        .with_timezone(&timezone)
        .format(EXPIRY_FORMAT)
        .to_string()
}

/// Keeps a valid credential at hand.
pub struct TokenGuard<P: ?Sized> {
    provider: Arc<P>,
    current: Option<Credential>,
    timezone: Tz,
}

impl<P: MarketDataPort + ?Sized> TokenGuard<P> {
    /// Create a guard with no credential yet.
    #[must_use]
    pub const fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            current: None,
            timezone: Tz::UTC,
        }
    }

    /// Create a guard around an already fetched credential.
    #[must_use]
    pub const fn with_credential(provider: Arc<P>, credential: Credential) -> Self {
        Self {
            provider,
            current: Some(credential),
            timezone: Tz::UTC,
        }
    }

    /// Log expiry times in `timezone` instead of UTC.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Current credential, if one has been fetched.
    #[must_use]
    pub const fn current(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    /// Return a credential that is valid for at least another hour.
    ///
    /// The held credential is returned unchanged unless `now + 1h` is past
    /// its expiry, in which case it is discarded and a new one is fetched.
    ///
    /// # Errors
    ///
    /// Returns the provider error if a fetch was needed and failed. The
    /// stale credential is dropped either way.
    pub async fn ensure_fresh(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<&Credential, MarketDataError> {
        let stale = self
            .current
            .as_ref()
            .is_none_or(|credential| credential.needs_refresh(now));

        if stale {
            self.refresh().await
        } else {
            self.current
                .as_ref()
                .ok_or_else(|| MarketDataError::InvalidResponse("no credential available".to_string()))
        }
    }

    /// Discard the held credential and fetch a new one.
    ///
    /// # Errors
    ///
    /// Returns the provider error. No credential is held afterwards.
    pub async fn refresh(&mut self) -> Result<&Credential, MarketDataError> {
        if let Some(old) = self.current.take() {
            tracing::warn!(
                expires_at = %local_expiry(old.expires_at(), self.timezone),
                "Token expires within the hour, fetching new token"
            );
        } else {
            tracing::info!("Fetching credentials for live streaming");
        }

        let credential = self.provider.authenticate().await?;
        tracing::info!(
            user_id = credential.user_id(),
            expires_at = %local_expiry(credential.expires_at(), self.timezone),
            "Fetched streaming token"
        );

        Ok(self.current.insert(credential))
    }
}
