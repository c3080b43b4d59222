//! Streaming Credential
//!
//! The short-lived token handed out by the realtime auth endpoint. A
//! credential is never mutated: when it nears expiry it is discarded and
//! replaced by a freshly fetched one.

use chrono::{DateTime, TimeDelta, Utc};

/// Safety margin before expiry at which a credential counts as stale.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::hours(1);

/// Subscriber id, bearer token and expiry of a streaming session.
///
/// The `Debug` implementation redacts the token for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a new credential.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            expires_at,
        }
    }

    /// Subscriber id, also the name of the private channel.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Bearer token for the realtime relay.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Instant at which the relay stops accepting the token.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Instant from which the credential is considered stale.
    #[must_use]
    pub fn refresh_at(&self) -> DateTime<Utc> {
        self.expires_at - REFRESH_MARGIN
    }

    /// Check whether the credential must be replaced.
    ///
    /// True iff `now + 1h` is strictly later than the expiry.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + REFRESH_MARGIN > self.expires_at
    }

    /// Time left until [`Self::refresh_at`], zero if already passed.
    #[must_use]
    pub fn time_until_refresh(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.refresh_at() - now).to_std().unwrap_or_default()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use test_case::test_case;

    fn expiring_at(expires_at: DateTime<Utc>) -> Credential {
        Credential::new("usr_abc", "secret-token", expires_at)
    }

    #[test_case(TimeDelta::hours(2), false ; "two hours left")]
    #[test_case(TimeDelta::hours(1) + TimeDelta::seconds(1), false ; "just over margin")]
    #[test_case(TimeDelta::hours(1), false ; "exactly at margin")]
    #[test_case(TimeDelta::minutes(59), true ; "inside margin")]
    #[test_case(TimeDelta::zero(), true ; "expiring now")]
    #[test_case(TimeDelta::hours(-3), true ; "already expired")]
    fn needs_refresh_iff_now_plus_margin_exceeds_expiry(left: TimeDelta, expected: bool) {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let credential = expiring_at(now + left);
        assert_eq!(credential.needs_refresh(now), expected);
    }

    #[test]
    fn refresh_at_is_one_hour_before_expiry() {
        let expires = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let credential = expiring_at(expires);
        assert_eq!(
            credential.refresh_at(),
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn time_until_refresh_saturates_at_zero() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let fresh = expiring_at(now + TimeDelta::hours(3));
        assert_eq!(fresh.time_until_refresh(now), Duration::from_secs(2 * 3600));

        let stale = expiring_at(now + TimeDelta::minutes(10));
        assert_eq!(stale.time_until_refresh(now), Duration::ZERO);
    }

    #[test]
    fn debug_redacts_token() {
        let credential = expiring_at(Utc::now());
        let debug = format!("{credential:?}");
        assert!(debug.contains("usr_abc"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-token"));
    }
}
