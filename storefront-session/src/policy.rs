//! Error visibility policy
//!
//! Decides whether a failed request should reach the user. 401s are the
//! interesting case: most of them are an expected part of token rotation
//! and are resolved by the reactive refresh before anyone notices.

use crate::route::AuthEndpoint;
use crate::route::AuthEndpoints;
use crate::route::RouteKind;
use crate::route::RouteRules;

/// Everything the policy looks at for one failed request.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// API path of the failed request.
    pub endpoint: &'a str,
    /// HTTP status, if the server answered.
    pub status: Option<u16>,
    /// Client navigation path at the time of failure.
    pub route: &'a str,
    /// Whether a refresh-token cookie is present.
    pub has_refresh_cookie: bool,
    /// Whether the caller flagged the request as silent.
    pub silent_requested: bool,
}

/// Why an error was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// The caller asked for silence.
    SilentRequested,
    /// A 401 from the refresh endpoint during normal rotation.
    SilentRefreshRotation,
    /// A 401 on a protected route that the reactive refresh is expected to resolve.
    SilentRecoverable,
    /// A 401 from login, registration or profile: the user must see it.
    VisibleCredentials,
    /// A 401 with no refresh-token cookie: nothing can recover it.
    VisibleNoSession,
    /// A 401 on a public or auth page.
    VisibleUnprotected,
    /// Any non-401 failure.
    Visible,
}

impl Visibility {
    /// Returns `true` if the error should be hidden.
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            Self::SilentRequested | Self::SilentRefreshRotation | Self::SilentRecoverable
        )
    }
}

/// Classifies failed requests as silent or visible.
///
/// # Example
///
/// ```
/// use storefront_session::policy::{FailureContext, SilentErrorPolicy};
/// use storefront_session::route::{AuthEndpoints, RouteRules};
///
/// let policy = SilentErrorPolicy::new(AuthEndpoints::default(), RouteRules::default());
/// let silent = policy.is_silent(&FailureContext {
///     endpoint: "/api/orders",
///     status: Some(401),
///     route: "/admin/orders",
///     has_refresh_cookie: true,
///     silent_requested: false,
/// });
/// assert!(silent);
/// ```
#[derive(Debug, Clone)]
pub struct SilentErrorPolicy {
    endpoints: AuthEndpoints,
    routes: RouteRules,
}

impl SilentErrorPolicy {
    /// Creates a policy over the given endpoint and route tables.
    pub fn new(endpoints: AuthEndpoints, routes: RouteRules) -> Self {
        Self { endpoints, routes }
    }

    /// Classifies a failure.
    pub fn classify(&self, ctx: &FailureContext<'_>) -> Visibility {
        if ctx.silent_requested {
            return Visibility::SilentRequested;
        }

        if ctx.status != Some(401) {
            return Visibility::Visible;
        }

        match self.endpoints.classify(ctx.endpoint) {
            Some(AuthEndpoint::Refresh) => return Visibility::SilentRefreshRotation,
            Some(AuthEndpoint::Login | AuthEndpoint::Register | AuthEndpoint::Profile) => {
                return Visibility::VisibleCredentials;
            }
            Some(AuthEndpoint::Logout) | None => {}
        }

        if !ctx.has_refresh_cookie {
            return Visibility::VisibleNoSession;
        }

        match self.routes.classify(ctx.route) {
            RouteKind::Protected => Visibility::SilentRecoverable,
            RouteKind::Public | RouteKind::AuthPage => Visibility::VisibleUnprotected,
        }
    }

    /// Returns `true` if the failure should be hidden.
    pub fn is_silent(&self, ctx: &FailureContext<'_>) -> bool {
        self.classify(ctx).is_silent()
    }
}
