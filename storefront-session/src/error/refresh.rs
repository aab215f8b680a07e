//! Refresh error types

use std::time::Duration;

/// Errors produced by a token refresh attempt.
///
/// Every caller that joined the same refresh receives a clone of the same
/// error, so this type is `Clone` and carries no transport handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The refresh endpoint rejected the refresh-token cookie (HTTP 401).
    #[error("Refresh rejected: {}", .message.as_deref().unwrap_or("unauthorized"))]
    Unauthorized {
        /// Server-provided message, if any.
        message: Option<String>,
    },

    /// The server declared the session unrecoverable.
    #[error("Session terminated by server")]
    ForceLogout,

    /// The refresh endpoint is rate limiting this client (HTTP 429).
    #[error("Refresh rate limited{}", .retry_after.map(|d| format!(", retry after {}s", d.as_secs())).unwrap_or_default())]
    RateLimited {
        /// How long to wait before trying again, if known.
        retry_after: Option<Duration>,
    },

    /// Any other non-success status from the refresh endpoint.
    #[error("Refresh failed with HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The refresh call never produced a response.
    #[error("Network error during refresh: {0}")]
    Network(String),
}

impl RefreshError {
    /// Creates an unauthorized error with an optional server message.
    pub fn unauthorized(message: Option<String>) -> Self {
        Self::Unauthorized { message }
    }

    /// Returns `true` for failures that count toward the consecutive failure threshold.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if the server asked the client to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if the server signalled an unrecoverable session.
    pub fn is_force_logout(&self) -> bool {
        matches!(self, Self::ForceLogout)
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
