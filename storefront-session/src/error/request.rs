//! Request error wrapper

use reqwest::Method;

use super::ApiError;

/// A failed API request together with its visibility.
///
/// `silent` is decided once, when the error is produced, by the
/// [`SilentErrorPolicy`](crate::policy::SilentErrorPolicy). UI code should
/// skip toasts and console output for silent errors.
#[derive(Debug, thiserror::Error)]
#[error("{method} {path} failed: {source}")]
pub struct RequestError {
    /// Method of the failed request.
    pub method: Method,
    /// Path of the failed request, relative to the API base URL.
    pub path: String,
    /// Whether the failure should be hidden from the user.
    pub silent: bool,
    /// The underlying error.
    #[source]
    pub source: ApiError,
}

impl RequestError {
    /// Creates a new visible request error.
    pub fn new(method: Method, path: impl Into<String>, source: impl Into<ApiError>) -> Self {
        Self {
            method,
            path: path.into(),
            silent: false,
            source: source.into(),
        }
    }

    /// Sets the visibility of this error.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Returns the HTTP status code if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        self.source.status_code()
    }

    /// Returns `true` if this is an HTTP 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.source.is_unauthorized()
    }

    /// Returns `true` if the error should be shown to the user.
    pub fn is_visible(&self) -> bool {
        !self.silent
    }
}
