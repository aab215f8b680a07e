//! Route and endpoint classification
//!
//! Two tables drive whether auth work should happen at all:
//! - [`RouteRules`] classifies client navigation paths (`/admin/orders`,
//!   `/login`, `/products`, ...) into [`RouteKind`]s.
//! - [`AuthEndpoints`] recognises the API endpoints that belong to the
//!   authentication flow itself and must never trigger a refresh.

/// Classification of a client navigation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Browsable without a session (catalog, product pages, home).
    Public,
    /// Login, registration and password recovery pages.
    AuthPage,
    /// Requires an authenticated session (admin dashboard, account pages).
    Protected,
}

impl RouteKind {
    /// Returns `true` for protected routes.
    pub fn is_protected(&self) -> bool {
        matches!(self, Self::Protected)
    }
}

/// Rules for classifying navigation paths.
///
/// Auth pages match exactly (ignoring a trailing slash). Protected prefixes
/// match whole path segments, so `/admin` covers `/admin/orders` but not
/// `/administrators`. Anything else is public.
///
/// # Example
///
/// ```
/// use storefront_session::route::{RouteKind, RouteRules};
///
/// let rules = RouteRules::default();
/// assert_eq!(rules.classify("/products"), RouteKind::Public);
/// assert_eq!(rules.classify("/admin/orders"), RouteKind::Protected);
/// assert_eq!(rules.classify("/login?next=/cart"), RouteKind::AuthPage);
/// ```
#[derive(Debug, Clone)]
pub struct RouteRules {
    /// Paths of authentication pages.
    pub auth_pages: Vec<String>,
    /// Path prefixes that require a session.
    pub protected_prefixes: Vec<String>,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            auth_pages: ["/login", "/register", "/forgot-password", "/reset-password"]
                .into_iter()
                .map(String::from)
                .collect(),
            protected_prefixes: [
                "/admin",
                "/account",
                "/profile",
                "/orders",
                "/checkout",
                "/wishlist",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl RouteRules {
    /// Creates rules with no auth pages and no protected prefixes.
    pub fn empty() -> Self {
        Self {
            auth_pages: Vec::new(),
            protected_prefixes: Vec::new(),
        }
    }

    /// Adds an auth page path.
    pub fn with_auth_page(mut self, path: impl Into<String>) -> Self {
        self.auth_pages.push(path.into());
        self
    }

    /// Adds a protected path prefix.
    pub fn with_protected_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.protected_prefixes.push(prefix.into());
        self
    }

    /// Classifies a navigation path.
    pub fn classify(&self, path: &str) -> RouteKind {
        let path = normalize(path);

        if self.auth_pages.iter().any(|page| normalize(page) == path) {
            return RouteKind::AuthPage;
        }

        if self
            .protected_prefixes
            .iter()
            .any(|prefix| segment_prefix(path, normalize(prefix)))
        {
            return RouteKind::Protected;
        }

        RouteKind::Public
    }
}

// =============================================================================
// Auth endpoints
// =============================================================================

/// An API endpoint that belongs to the authentication flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEndpoint {
    /// Credential login.
    Login,
    /// Account registration.
    Register,
    /// Access token refresh.
    Refresh,
    /// Session logout.
    Logout,
    /// Current user profile.
    Profile,
}

impl AuthEndpoint {
    /// Returns `true` if a 401 from this endpoint must never start a refresh.
    ///
    /// The profile endpoint is a regular protected endpoint for refresh
    /// purposes; it only differs in error visibility.
    pub fn excluded_from_refresh(&self) -> bool {
        !matches!(self, Self::Profile)
    }
}

/// API paths of the authentication endpoints.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    /// Login endpoint. Default: `/api/auth/login`
    pub login: String,
    /// Registration endpoint. Default: `/api/auth/register`
    pub register: String,
    /// Refresh endpoint. Default: `/api/auth/refresh`
    pub refresh: String,
    /// Logout endpoint. Default: `/api/auth/logout`
    pub logout: String,
    /// Profile endpoint. Default: `/api/auth/profile`
    pub profile: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            register: "/api/auth/register".to_string(),
            refresh: "/api/auth/refresh".to_string(),
            logout: "/api/auth/logout".to_string(),
            profile: "/api/auth/profile".to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Identifies the auth endpoint a request path targets, if any.
    pub fn classify(&self, path: &str) -> Option<AuthEndpoint> {
        let path = normalize(path);
        [
            (&self.login, AuthEndpoint::Login),
            (&self.register, AuthEndpoint::Register),
            (&self.refresh, AuthEndpoint::Refresh),
            (&self.logout, AuthEndpoint::Logout),
            (&self.profile, AuthEndpoint::Profile),
        ]
        .into_iter()
        .find(|(endpoint, _)| normalize(endpoint) == path)
        .map(|(_, kind)| kind)
    }

    /// Returns `true` if requests to `path` must bypass refresh handling.
    pub fn bypasses_refresh(&self, path: &str) -> bool {
        self.classify(path)
            .is_some_and(|endpoint| endpoint.excluded_from_refresh())
    }
}

/// Strips query, fragment and trailing slash.
fn normalize(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn segment_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_routes() {
        let rules = RouteRules::default();
        assert_eq!(rules.classify("/"), RouteKind::Public);
        assert_eq!(rules.classify("/products"), RouteKind::Public);
        assert_eq!(rules.classify("/products/42"), RouteKind::Public);
        assert_eq!(rules.classify("/administrators"), RouteKind::Public);
    }

    #[test]
    fn test_protected_routes() {
        let rules = RouteRules::default();
        assert_eq!(rules.classify("/admin"), RouteKind::Protected);
        assert_eq!(rules.classify("/admin/orders"), RouteKind::Protected);
        assert_eq!(rules.classify("/admin/products/"), RouteKind::Protected);
        assert_eq!(rules.classify("/account/settings#email"), RouteKind::Protected);
    }

    #[test]
    fn test_auth_pages() {
        let rules = RouteRules::default();
        assert_eq!(rules.classify("/login"), RouteKind::AuthPage);
        assert_eq!(rules.classify("/login/"), RouteKind::AuthPage);
        assert_eq!(rules.classify("/register?ref=home"), RouteKind::AuthPage);
    }

    #[test]
    fn test_custom_rules() {
        let rules = RouteRules::empty()
            .with_auth_page("/signin")
            .with_protected_prefix("/dashboard/");
        assert_eq!(rules.classify("/signin"), RouteKind::AuthPage);
        assert_eq!(rules.classify("/dashboard/stats"), RouteKind::Protected);
        assert_eq!(rules.classify("/admin"), RouteKind::Public);
    }

    #[test]
    fn test_auth_endpoints() {
        let endpoints = AuthEndpoints::default();
        assert_eq!(
            endpoints.classify("/api/auth/refresh"),
            Some(AuthEndpoint::Refresh)
        );
        assert_eq!(
            endpoints.classify("/api/auth/login?redirect=1"),
            Some(AuthEndpoint::Login)
        );
        assert_eq!(endpoints.classify("/api/products"), None);

        assert!(endpoints.bypasses_refresh("/api/auth/register"));
        assert!(endpoints.bypasses_refresh("/api/auth/logout"));
        assert!(!endpoints.bypasses_refresh("/api/auth/profile"));
        assert!(!endpoints.bypasses_refresh("/api/orders"));
    }
}
