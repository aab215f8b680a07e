//! Access token expiry tracking

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

/// Known expiry times of the current session's tokens.
///
/// The access token itself lives in an HttpOnly cookie and is never seen by
/// the client; only its expiry is tracked, so the client can refresh before
/// requests start failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenExpiry {
    /// When the access token expires, if known.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// When the refresh token expires, if the server reported it.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl TokenExpiry {
    /// Creates an expiry with only the access token expiry known.
    pub fn new(access_expires_at: DateTime<Utc>) -> Self {
        Self {
            access_expires_at: Some(access_expires_at),
            refresh_expires_at: None,
        }
    }

    /// Creates an expiry with both token expiries.
    pub fn with_refresh(
        access_expires_at: Option<DateTime<Utc>>,
        refresh_expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_expires_at,
            refresh_expires_at,
        }
    }

    /// Creates an expiry `ttl` from now.
    pub fn in_duration(ttl: Duration) -> Self {
        Self::new(Utc::now() + to_chrono(ttl))
    }

    /// Returns `true` if the access token expiry is known.
    pub fn is_known(&self) -> bool {
        self.access_expires_at.is_some()
    }

    /// Returns `true` if the access token has expired.
    ///
    /// Returns `false` if expiration time is unknown.
    pub fn is_expired(&self) -> bool {
        self.access_expires_at.is_some_and(|exp| Utc::now() >= exp)
    }

    /// Returns `true` if the access token will expire within the given duration.
    ///
    /// Returns `false` if expiration time is unknown.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.access_expires_at
            .is_some_and(|exp| Utc::now() + to_chrono(duration) >= exp)
    }

    /// Returns the time left on the access token, zero if already expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.access_expires_at
            .map(|exp| (exp - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Returns `true` if the refresh token is known to have expired.
    pub fn refresh_expired(&self) -> bool {
        self.refresh_expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_expiry_never_due() {
        let expiry = TokenExpiry::default();
        assert!(!expiry.is_known());
        assert!(!expiry.is_expired());
        assert!(!expiry.expires_within(Duration::from_secs(3600)));
        assert_eq!(expiry.remaining(), None);
    }

    #[test]
    fn test_expires_within_buffer() {
        let expiry = TokenExpiry::in_duration(Duration::from_secs(30));
        assert!(expiry.expires_within(Duration::from_secs(60)));
        assert!(!expiry.expires_within(Duration::from_secs(10)));
        assert!(!expiry.is_expired());
    }

    #[test]
    fn test_expired() {
        let expiry = TokenExpiry::new(Utc::now() - chrono::Duration::seconds(5));
        assert!(expiry.is_expired());
        assert_eq!(expiry.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_refresh_expired() {
        let past = Utc::now() - chrono::Duration::seconds(1);
        let expiry = TokenExpiry::with_refresh(None, Some(past));
        assert!(expiry.refresh_expired());
        assert!(!expiry.is_expired());
    }
}
