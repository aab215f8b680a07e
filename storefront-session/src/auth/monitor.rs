//! Background session check
//!
//! While a user is logged in, a periodic check confirms that the
//! refresh-token cookie can still be redeemed, so an expired session is
//! noticed before the user's next action fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::CookieSource;
use super::RefreshCoordinator;
use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::host::SessionHost;
use crate::route::RouteRules;

/// Why a background check did not call the refresh endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No user is logged in.
    Unauthenticated,
    /// The user is not on a protected route.
    UnprotectedRoute,
    /// A refresh succeeded within the recent-refresh window.
    RecentlyRefreshed,
    /// A refresh is already running.
    RefreshInProgress,
    /// User state was populated within the settle window.
    UserJustLoaded,
    /// There is no refresh-token cookie to redeem.
    NoRefreshCookie,
}

/// Result of one background check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check did not run.
    Skipped(SkipReason),
    /// The refresh-token cookie was redeemed.
    Refreshed,
    /// The refresh failed.
    Failed(RefreshError),
}

/// Periodic validation of the refresh-token cookie.
#[derive(Clone)]
pub struct SessionMonitor {
    coordinator: RefreshCoordinator,
    host: Arc<dyn SessionHost>,
    cookies: Arc<dyn CookieSource>,
    routes: RouteRules,
    refresh_cookie: String,
    recent_refresh_window: Duration,
    user_settle_window: Duration,
}

impl SessionMonitor {
    /// Creates a monitor over the given session collaborators.
    pub fn new(
        coordinator: RefreshCoordinator,
        host: Arc<dyn SessionHost>,
        cookies: Arc<dyn CookieSource>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            coordinator,
            host,
            cookies,
            routes: config.routes.clone(),
            refresh_cookie: config.refresh_cookie.clone(),
            recent_refresh_window: config.recent_refresh_window,
            user_settle_window: config.user_settle_window,
        }
    }

    /// Returns why a check would be skipped right now, if it would.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        if !self.host.is_authenticated() {
            return Some(SkipReason::Unauthenticated);
        }
        if !self.routes.classify(&self.host.current_path()).is_protected() {
            return Some(SkipReason::UnprotectedRoute);
        }
        if within(self.coordinator.last_refresh(), self.recent_refresh_window) {
            return Some(SkipReason::RecentlyRefreshed);
        }
        if self.coordinator.is_refreshing() {
            return Some(SkipReason::RefreshInProgress);
        }
        if within(self.host.user_loaded_at(), self.user_settle_window) {
            return Some(SkipReason::UserJustLoaded);
        }
        if !self.cookies.has_cookie(&self.refresh_cookie) {
            return Some(SkipReason::NoRefreshCookie);
        }
        None
    }

    /// Runs one check.
    pub async fn check(&self) -> CheckOutcome {
        if let Some(reason) = self.skip_reason() {
            log::debug!("session check skipped: {:?}", reason);
            return CheckOutcome::Skipped(reason);
        }

        match self.coordinator.ensure_fresh_token().await {
            Ok(()) => CheckOutcome::Refreshed,
            Err(err) => {
                log::debug!("session check failed: {}", err);
                CheckOutcome::Failed(err)
            }
        }
    }

    /// Runs checks on a schedule until the returned task is cancelled or dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self, initial_delay: Duration, interval: Duration) -> ScheduledTask {
        ScheduledTask::spawn_periodic(initial_delay, interval, move || {
            let monitor = self.clone();
            async move {
                monitor.check().await;
            }
        })
    }
}

fn within(at: Option<Instant>, window: Duration) -> bool {
    at.is_some_and(|at| at.elapsed() < window)
}

// =============================================================================
// Scheduled Task
// =============================================================================

/// A periodic background task that stops when cancelled or dropped.
///
/// Owning the handle ties the timer's lifetime to the session that started
/// it, so timers never outlive a logout.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Runs `tick` after `initial_delay` and then every `interval`.
    ///
    /// A zero interval is raised to one millisecond. Must be called from
    /// within a Tokio runtime.
    pub fn spawn_periodic<F, Fut>(initial_delay: Duration, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    /// Stops the task.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn test_scheduled_task_ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let task = ScheduledTask::spawn_periodic(
            Duration::from_millis(5),
            Duration::from_millis(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        task.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");
        assert!(task.is_finished());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_scheduled_task_stops_on_drop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let task = ScheduledTask::spawn_periodic(
            Duration::from_millis(50),
            Duration::from_millis(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        drop(task);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
