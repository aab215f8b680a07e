//! The refresh endpoint

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::TokenExpiry;
use crate::error::RefreshError;

/// Server marker for an unrecoverable session.
pub const FORCE_LOGOUT: &str = "force-logout";

/// A call that exchanges the refresh-token cookie for a new access token.
///
/// [`HttpRefreshEndpoint`] is the production implementation; the trait exists
/// so the coordinator can be driven by anything that can answer the call.
#[async_trait]
pub trait RefreshEndpoint: Send + Sync {
    /// Performs one refresh call and returns the new token expiry.
    async fn refresh(&self) -> Result<TokenExpiry, RefreshError>;
}

/// `POST /api/auth/refresh` over the shared HTTP client.
///
/// The request has no body; the refresh-token cookie is attached by the
/// client's cookie jar.
#[derive(Debug, Clone)]
pub struct HttpRefreshEndpoint {
    http_client: Client,
    url: Url,
    timeout: Option<Duration>,
}

impl HttpRefreshEndpoint {
    /// Creates an endpoint posting to `url`.
    pub fn new(http_client: Client, url: Url) -> Self {
        Self {
            http_client,
            url,
            timeout: None,
        }
    }

    /// Sets a per-call timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RefreshEndpoint for HttpRefreshEndpoint {
    async fn refresh(&self) -> Result<TokenExpiry, RefreshError> {
        let mut request = self.http_client.post(self.url.clone());

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await?;

        interpret_response(status, retry_after, &body)
    }
}

// =============================================================================
// Response Parsing
// =============================================================================

/// Maps a refresh endpoint answer to a refresh result.
///
/// - 200: `{ accessTokenExpiresAt, refreshTokenExpiresAt? }`
/// - 401: `{ message? }`, where `"force-logout"` ends the session
/// - 429: rate limited, never an authentication failure
pub fn interpret_response(
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> Result<TokenExpiry, RefreshError> {
    match status {
        // A 2xx means the cookie was rotated, readable expiry or not.
        200..=299 if body.trim().is_empty() => Ok(TokenExpiry::default()),
        200..=299 => {
            let expiry = serde_json::from_str::<ExpiryBody>(body)
                .map_err(|e| e.to_string())
                .and_then(ExpiryBody::into_expiry);
            Ok(expiry.unwrap_or_else(|err| {
                log::warn!("ignoring refresh token expiry: {}", err);
                TokenExpiry::default()
            }))
        }
        401 => {
            let message = serde_json::from_str::<MessageBody>(body)
                .ok()
                .and_then(|b| b.message);
            if message.as_deref() == Some(FORCE_LOGOUT) {
                Err(RefreshError::ForceLogout)
            } else {
                Err(RefreshError::unauthorized(message))
            }
        }
        429 => Err(RefreshError::RateLimited { retry_after }),
        _ => Err(RefreshError::Http {
            status,
            message: body.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: Option<String>,
}

/// Expiry fields shared by the login and refresh responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExpiryBody {
    #[serde(default)]
    access_token_expires_at: Option<Timestamp>,
    #[serde(default)]
    refresh_token_expires_at: Option<Timestamp>,
}

impl ExpiryBody {
    pub(crate) fn into_expiry(self) -> Result<TokenExpiry, String> {
        let access = self
            .access_token_expires_at
            .map(Timestamp::into_datetime)
            .transpose()?;
        let refresh = self
            .refresh_token_expires_at
            .map(Timestamp::into_datetime)
            .transpose()?;
        Ok(TokenExpiry::with_refresh(access, refresh))
    }
}

/// A timestamp that can be epoch milliseconds (number or string) or RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

impl Timestamp {
    fn into_datetime(self) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Millis(ms) => millis_to_datetime(ms),
            Self::FractionalMillis(ms) if ms.is_finite() => millis_to_datetime(ms as i64),
            Self::FractionalMillis(ms) => Err(format!("invalid timestamp: {}", ms)),
            Self::Text(s) => match s.trim().parse::<i64>() {
                Ok(ms) => millis_to_datetime(ms),
                Err(_) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| format!("invalid timestamp: {}", s)),
            },
        }
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("timestamp out of range: {}", ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_millis() {
        let expiry = interpret_response(
            200,
            None,
            r#"{"accessTokenExpiresAt":1767225600000,"refreshTokenExpiresAt":1767830400000}"#,
        )
        .unwrap();
        assert_eq!(
            expiry.access_expires_at,
            DateTime::from_timestamp_millis(1_767_225_600_000)
        );
        assert_eq!(
            expiry.refresh_expires_at,
            DateTime::from_timestamp_millis(1_767_830_400_000)
        );
    }

    #[test]
    fn test_success_with_text_timestamps() {
        let expiry = interpret_response(
            200,
            None,
            r#"{"accessTokenExpiresAt":"1767225600000","refreshTokenExpiresAt":"2026-01-08T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            expiry.access_expires_at,
            DateTime::from_timestamp_millis(1_767_225_600_000)
        );
        assert_eq!(
            expiry.refresh_expires_at.map(|dt| dt.to_rfc3339()),
            Some("2026-01-08T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_success_without_expiry() {
        assert_eq!(interpret_response(204, None, ""), Ok(TokenExpiry::default()));
        assert!(!interpret_response(200, None, "{}").unwrap().is_known());
    }

    #[test]
    fn test_success_with_unreadable_expiry() {
        assert_eq!(interpret_response(200, None, "<html>"), Ok(TokenExpiry::default()));
        assert_eq!(
            interpret_response(200, None, r#"{"accessTokenExpiresAt":"soon"}"#),
            Ok(TokenExpiry::default())
        );
    }

    #[test]
    fn test_success_with_fractional_millis() {
        let expiry =
            interpret_response(200, None, r#"{"accessTokenExpiresAt":1767225600000.0}"#).unwrap();
        assert_eq!(
            expiry.access_expires_at,
            DateTime::from_timestamp_millis(1_767_225_600_000)
        );
    }

    #[test]
    fn test_unauthorized() {
        assert_eq!(
            interpret_response(401, None, "").unwrap_err(),
            RefreshError::unauthorized(None)
        );
        assert_eq!(
            interpret_response(401, None, r#"{"message":"Refresh token expired"}"#).unwrap_err(),
            RefreshError::unauthorized(Some("Refresh token expired".to_string()))
        );
    }

    #[test]
    fn test_force_logout() {
        assert_eq!(
            interpret_response(401, None, r#"{"message":"force-logout"}"#).unwrap_err(),
            RefreshError::ForceLogout
        );
    }

    #[test]
    fn test_rate_limited() {
        let err = interpret_response(429, Some(Duration::from_secs(7)), "Too many").unwrap_err();
        assert_eq!(
            err,
            RefreshError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_server_error() {
        let err = interpret_response(503, None, "maintenance").unwrap_err();
        assert_eq!(
            err,
            RefreshError::Http {
                status: 503,
                message: "maintenance".to_string()
            }
        );
    }
}
