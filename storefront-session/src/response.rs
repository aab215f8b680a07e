//! API responses

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// A buffered response from the storefront API.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: u16,
    headers: HeaderMap,
    body: String,
}

impl ApiResponse {
    /// Creates a response from its parts.
    pub fn new(status: u16, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw body.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Consumes the response and returns the raw body.
    pub fn into_text(self) -> String {
        self.body
    }

    /// Parses the body as JSON.
    ///
    /// An empty body parses as JSON `null`, so `Option<T>` and
    /// `serde_json::Value` targets accept `204 No Content`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| ApiError::parse_with_body(e.to_string(), &self.body))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_json() {
        let response = ApiResponse::new(200, HeaderMap::new(), r#"{"total":3}"#.to_string());
        let value: Value = response.json().unwrap();
        assert_eq!(value["total"], 3);
    }

    #[test]
    fn test_empty_body_is_null() {
        let response = ApiResponse::new(204, HeaderMap::new(), String::new());
        let value: Option<Value> = response.json().unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_parse_error_keeps_body() {
        let response = ApiResponse::new(200, HeaderMap::new(), "<html>".to_string());
        match response.json::<Value>() {
            Err(ApiError::Parse { body, .. }) => assert_eq!(body.as_deref(), Some("<html>")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
