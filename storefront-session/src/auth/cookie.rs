//! Refresh-token cookie presence

use std::sync::Arc;

use reqwest::cookie::CookieStore;
use reqwest::cookie::Jar;
use url::Url;

/// Read access to the cookies the server has set.
///
/// Only presence is observable; cookie values are opaque credentials.
pub trait CookieSource: Send + Sync {
    /// Returns `true` if a non-empty cookie with this name would be sent.
    fn has_cookie(&self, name: &str) -> bool;
}

/// The cookie jar shared with the HTTP client, seen from one request URL.
///
/// Point it at the refresh endpoint: that is the request the refresh-token
/// cookie must reach, whatever `Path` the server scoped it to.
#[derive(Clone)]
pub struct JarCookies {
    jar: Arc<Jar>,
    url: Url,
}

impl JarCookies {
    /// Creates a view of `jar` for requests to `url`.
    pub fn new(jar: Arc<Jar>, url: Url) -> Self {
        Self { jar, url }
    }

    /// Expires a cookie locally.
    ///
    /// Used on logout so presence checks stop succeeding even if the server
    /// never answers the logout call. The cookie's `Path` is not observable,
    /// so every path prefix of the request URL is expired.
    pub fn expire(&self, name: &str) {
        for path in path_prefixes(self.url.path()) {
            self.jar
                .add_cookie_str(&format!("{name}=; Max-Age=0; Path={path}"), &self.url);
        }
    }
}

impl std::fmt::Debug for JarCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JarCookies").field("url", &self.url.as_str()).finish()
    }
}

impl CookieSource for JarCookies {
    fn has_cookie(&self, name: &str) -> bool {
        self.jar
            .cookies(&self.url)
            .and_then(|header| header.to_str().ok().map(|h| header_has_cookie(h, name)))
            .unwrap_or(false)
    }
}

/// `/a/b` -> `/`, `/a`, `/a/b`
fn path_prefixes(path: &str) -> Vec<&str> {
    let mut prefixes = vec!["/"];
    prefixes.extend(
        path.match_indices('/')
            .skip(1)
            .map(|(i, _)| &path[..i])
            .chain(std::iter::once(path.trim_end_matches('/')))
            .filter(|prefix| !prefix.is_empty()),
    );
    prefixes.dedup();
    prefixes
}

/// Checks a `Cookie` header value for a non-empty cookie named `name`.
pub fn header_has_cookie(header: &str, name: &str) -> bool {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(key, value)| key.trim() == name && !value.trim().is_empty())
}
