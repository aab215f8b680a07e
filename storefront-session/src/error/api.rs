//! API error types

use super::RefreshError;

/// Errors that can occur during API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP error response from the API.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Application error code from the response body, if available.
        code: Option<String>,
    },

    /// Network error during API call.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request was held for a token refresh and the refresh failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to parse API response.
    #[error("Response parse error: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
        /// Raw response body, if available.
        body: Option<String>,
    },
}

impl ApiError {
    /// Creates a new HTTP error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            code: None,
        }
    }

    /// Creates a new HTTP error from a raw response body.
    ///
    /// JSON bodies of the form `{ "message": ..., "code": ... }` are unpacked;
    /// anything else is kept verbatim as the message.
    pub fn from_body(status: u16, body: String) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: Option<String>,
            code: Option<String>,
        }

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(ErrorBody {
                message: Some(message),
                code,
            }) => Self::Http {
                status,
                message,
                code,
            },
            _ => Self::http(status, body),
        }
    }

    /// Creates a new parse error with the raw response body.
    pub fn parse_with_body(message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            body: Some(body.into()),
        }
    }

    /// Returns the HTTP status code if this is an HTTP error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the application error code if available.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if this is an HTTP 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }
}
