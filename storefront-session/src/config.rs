//! Session configuration

use std::time::Duration;

use crate::route::AuthEndpoints;
use crate::route::RouteRules;

/// Timing and routing settings for session maintenance.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use storefront_session::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_expiry_buffer(Duration::from_secs(120))
///     .with_failure_threshold(5);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Refresh before a request when the access token expires within this window.
    ///
    /// Default: 60 seconds
    pub expiry_buffer: Duration,

    /// Minimum spacing between two refresh calls.
    ///
    /// Callers arriving inside the window receive the previous outcome.
    ///
    /// Default: 5 seconds
    pub refresh_cooldown: Duration,

    /// Consecutive rejected refreshes before the session is terminated.
    ///
    /// Default: 3
    pub failure_threshold: u32,

    /// Back-off after HTTP 429 when the server sends no `Retry-After`.
    ///
    /// Default: 30 seconds
    pub rate_limit_backoff: Duration,

    /// Upper bound on any 429 back-off, including a server's `Retry-After`.
    ///
    /// Default: 5 minutes
    pub max_rate_limit_backoff: Duration,

    /// Period of the background session check.
    ///
    /// Default: 5 minutes
    pub check_interval: Duration,

    /// Delay before the first background check after login.
    ///
    /// Default: 10 seconds
    pub check_initial_delay: Duration,

    /// The background check is skipped if a refresh succeeded this recently.
    ///
    /// Default: 2 minutes
    pub recent_refresh_window: Duration,

    /// The background check is skipped if the user was loaded this recently.
    ///
    /// Default: 10 seconds
    pub user_settle_window: Duration,

    /// Pause between the session-expired notice and the login redirect.
    ///
    /// Default: 1 second
    pub redirect_delay: Duration,

    /// Client route of the login page.
    ///
    /// Default: `/login`
    pub login_route: String,

    /// Name of the refresh-token cookie.
    ///
    /// Default: `refreshToken`
    pub refresh_cookie: String,

    /// API paths of the authentication endpoints.
    pub endpoints: AuthEndpoints,

    /// Navigation path classification.
    pub routes: RouteRules,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_buffer: Duration::from_secs(60),
            refresh_cooldown: Duration::from_secs(5),
            failure_threshold: 3,
            rate_limit_backoff: Duration::from_secs(30),
            max_rate_limit_backoff: Duration::from_secs(300), // 5 minutes
            check_interval: Duration::from_secs(300),       // 5 minutes
            check_initial_delay: Duration::from_secs(10),
            recent_refresh_window: Duration::from_secs(120), // 2 minutes
            user_settle_window: Duration::from_secs(10),
            redirect_delay: Duration::from_secs(1),
            login_route: "/login".to_string(),
            refresh_cookie: "refreshToken".to_string(),
            endpoints: AuthEndpoints::default(),
            routes: RouteRules::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pre-expiry refresh window.
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Sets the refresh cooldown.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Sets the consecutive failure threshold.
    ///
    /// A threshold of zero is treated as one.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the default back-off after HTTP 429.
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Sets the upper bound on any 429 back-off.
    pub fn with_max_rate_limit_backoff(mut self, max: Duration) -> Self {
        self.max_rate_limit_backoff = max;
        self
    }

    /// Sets the background check period and initial delay.
    pub fn with_check_schedule(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.check_initial_delay = initial_delay;
        self.check_interval = interval;
        self
    }

    /// Sets the recent-refresh skip window of the background check.
    pub fn with_recent_refresh_window(mut self, window: Duration) -> Self {
        self.recent_refresh_window = window;
        self
    }

    /// Sets the user-settle skip window of the background check.
    pub fn with_user_settle_window(mut self, window: Duration) -> Self {
        self.user_settle_window = window;
        self
    }

    /// Sets the pause before the login redirect.
    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    /// Sets the login page route.
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Sets the refresh-token cookie name.
    pub fn with_refresh_cookie(mut self, name: impl Into<String>) -> Self {
        self.refresh_cookie = name.into();
        self
    }

    /// Sets the auth endpoint paths.
    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Sets the route classification rules.
    pub fn with_routes(mut self, routes: RouteRules) -> Self {
        self.routes = routes;
        self
    }

    /// Creates a config with every timing window at zero.
    ///
    /// Refreshes are never coalesced by cooldown, the redirect is immediate
    /// and the background check runs without skip windows. Useful for tests
    /// and scripted clients.
    pub fn immediate() -> Self {
        Self {
            refresh_cooldown: Duration::ZERO,
            rate_limit_backoff: Duration::ZERO,
            check_initial_delay: Duration::ZERO,
            recent_refresh_window: Duration::ZERO,
            user_settle_window: Duration::ZERO,
            redirect_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
