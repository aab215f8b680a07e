//! Session termination
//!
//! `idle -> terminating -> idle`. Entry is guarded so that concurrent
//! escalations (several requests failing at once) produce one notice and one
//! redirect.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::host::Notice;
use crate::host::SessionHost;
use crate::route::RouteKind;
use crate::route::RouteRules;

/// Why the session is being terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The server sent the force-logout marker.
    ForceLogout,
    /// Too many consecutive refreshes were rejected.
    FailureThreshold {
        /// Number of consecutive failures observed.
        failures: u32,
    },
}

/// What a termination request actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// User state was cleared and the user sent to the login page.
    Redirected,
    /// The user is not on a protected route; the session was left alone.
    Skipped(RouteKind),
    /// Another termination was already running.
    AlreadyTerminating,
}

/// Ends unrecoverable sessions.
///
/// Cheap to clone; clones share the redirect guard.
#[derive(Clone)]
pub struct SessionTerminator {
    inner: Arc<TerminatorInner>,
}

struct TerminatorInner {
    host: Arc<dyn SessionHost>,
    routes: RouteRules,
    login_route: String,
    redirect_delay: Duration,
    terminating: AtomicBool,
}

impl SessionTerminator {
    /// Creates a terminator acting on `host`.
    pub fn new(host: Arc<dyn SessionHost>, config: &SessionConfig) -> Self {
        Self {
            inner: Arc::new(TerminatorInner {
                host,
                routes: config.routes.clone(),
                login_route: config.login_route.clone(),
                redirect_delay: config.redirect_delay,
                terminating: AtomicBool::new(false),
            }),
        }
    }

    /// Returns `true` while a termination is in progress.
    pub fn is_terminating(&self) -> bool {
        self.inner.terminating.load(Ordering::Acquire)
    }

    /// Terminates the session if the user is on a protected route.
    ///
    /// On a protected route: clears user and error state, shows the
    /// session-expired notice, waits `redirect_delay` so the notice can
    /// render, then navigates to the login route. Public routes and auth
    /// pages are left untouched.
    pub async fn terminate(&self, reason: TerminationReason) -> Termination {
        let inner = &self.inner;

        if inner
            .terminating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("session termination already in progress ({:?})", reason);
            return Termination::AlreadyTerminating;
        }
        // Released once navigation is done, or on early return / cancellation.
        let _guard = GuardReset(&inner.terminating);

        let path = inner.host.current_path();
        let kind = inner.routes.classify(&path);
        if !kind.is_protected() {
            log::debug!(
                "not terminating session on {:?} route {} ({:?})",
                kind,
                path,
                reason
            );
            return Termination::Skipped(kind);
        }

        log::info!("terminating session on {} ({:?})", path, reason);
        inner.host.clear_user();
        inner.host.clear_error();
        inner.host.notify(Notice::SessionExpired);

        if !inner.redirect_delay.is_zero() {
            tokio::time::sleep(inner.redirect_delay).await;
        }

        inner.host.navigate(&inner.login_route);
        Termination::Redirected
    }
}

impl std::fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("login_route", &self.inner.login_route)
            .field("terminating", &self.is_terminating())
            .finish()
    }
}

struct GuardReset<'a>(&'a AtomicBool);

impl Drop for GuardReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::MemoryHost;

    fn terminator(host: &Arc<MemoryHost>, delay: Duration) -> SessionTerminator {
        let config = SessionConfig::default().with_redirect_delay(delay);
        SessionTerminator::new(host.clone(), &config)
    }

    #[tokio::test]
    async fn test_protected_route_redirects() {
        let host = Arc::new(MemoryHost::with_user("/admin/orders", json!({ "id": 1 })));
        host.set_error("Failed to load orders");

        let outcome = terminator(&host, Duration::ZERO)
            .terminate(TerminationReason::ForceLogout)
            .await;

        assert_eq!(outcome, Termination::Redirected);
        assert!(host.user().is_none());
        assert!(host.error().is_none());
        assert_eq!(host.notices(), vec![Notice::SessionExpired]);
        assert_eq!(host.navigations(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_public_route_keeps_session() {
        let host = Arc::new(MemoryHost::with_user("/products", json!({ "id": 1 })));
        let terminator = terminator(&host, Duration::ZERO);

        let outcome = terminator
            .terminate(TerminationReason::FailureThreshold { failures: 3 })
            .await;

        assert_eq!(outcome, Termination::Skipped(RouteKind::Public));
        assert!(host.user().is_some());
        assert!(host.notices().is_empty());
        assert!(host.navigations().is_empty());
        assert!(!terminator.is_terminating());
    }

    #[tokio::test]
    async fn test_concurrent_terminations_redirect_once() {
        let host = Arc::new(MemoryHost::with_user("/admin/products", json!({ "id": 1 })));
        let terminator = terminator(&host, Duration::from_millis(50));

        let (first, second) = tokio::join!(
            terminator.terminate(TerminationReason::ForceLogout),
            terminator.terminate(TerminationReason::ForceLogout),
        );

        assert_eq!(first, Termination::Redirected);
        assert_eq!(second, Termination::AlreadyTerminating);
        assert_eq!(host.notices().len(), 1);
        assert_eq!(host.navigations().len(), 1);
        assert!(!terminator.is_terminating());
    }
}
