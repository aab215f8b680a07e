//! Single-flight token refresh.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::RefreshEndpoint;
use super::SessionTerminator;
use super::Termination;
use super::TerminationReason;
use super::TokenExpiry;
use crate::config::SessionConfig;
use crate::error::RefreshError;

/// Serializes token refreshes into at most one in-flight call.
///
/// Every caller that arrives while a refresh is running queues behind it and
/// receives the same outcome; no caller starts its own call while another is
/// outstanding. Callers arriving within the cooldown of the last call receive
/// that call's outcome without a new network request.
///
/// The coordinator is also the only writer of the session's token expiry
/// and failure counter. Everything else reads them through accessors.
///
/// Cheap to clone; clones share state.
///
/// # Example
///
/// ```ignore
/// let coordinator = RefreshCoordinator::new(endpoint, terminator, &SessionConfig::default());
///
/// // Any number of concurrent callers produce one refresh call.
/// let (a, b) = tokio::join!(
///     coordinator.ensure_fresh_token(),
///     coordinator.ensure_fresh_token(),
/// );
/// assert_eq!(a, b);
/// ```
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    endpoint: Arc<dyn RefreshEndpoint>,
    terminator: SessionTerminator,
    expiry_buffer: Duration,
    cooldown: Duration,
    failure_threshold: u32,
    rate_limit_backoff: Duration,
    max_rate_limit_backoff: Duration,
    /// Held for the whole duration of a refresh call; the wait queue.
    flight: Mutex<FlightState>,
    /// Bumped each time a refresh call settles.
    settled: AtomicU64,
    failures: AtomicU32,
    tokens: RwLock<TokenState>,
}

#[derive(Default)]
struct FlightState {
    last_attempt: Option<Instant>,
    /// `None` while a call is running or after a cancelled call.
    last_outcome: Option<Result<(), RefreshError>>,
    backoff_until: Option<Instant>,
}

#[derive(Default)]
struct TokenState {
    expiry: TokenExpiry,
    refreshed_at: Option<Instant>,
}

impl RefreshCoordinator {
    /// Creates a coordinator calling `endpoint` and escalating to `terminator`.
    pub fn new<E: RefreshEndpoint + 'static>(
        endpoint: E,
        terminator: SessionTerminator,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                endpoint: Arc::new(endpoint),
                terminator,
                expiry_buffer: config.expiry_buffer,
                cooldown: config.refresh_cooldown,
                failure_threshold: config.failure_threshold.max(1),
                rate_limit_backoff: config.rate_limit_backoff,
                max_rate_limit_backoff: config.max_rate_limit_backoff,
                flight: Mutex::new(FlightState::default()),
                settled: AtomicU64::new(0),
                failures: AtomicU32::new(0),
                tokens: RwLock::new(TokenState::default()),
            }),
        }
    }

    /// Makes sure the access token has just been refreshed.
    ///
    /// Joins a running refresh if there is one, reuses the previous outcome
    /// within the cooldown, and otherwise performs exactly one refresh call.
    ///
    /// On success the token expiry is updated and the failure counter reset.
    /// A rejected refresh counts toward the failure threshold; reaching it, or
    /// receiving the force-logout marker, terminates the session. Rate
    /// limiting never counts as a failure.
    pub async fn ensure_fresh_token(&self) -> Result<(), RefreshError> {
        let inner = &self.inner;
        let observed = inner.settled.load(Ordering::Acquire);
        let mut flight = inner.flight.lock().await;

        // A refresh settled while we were queued behind it
        if inner.settled.load(Ordering::Acquire) != observed {
            if let Some(outcome) = flight.last_outcome.clone() {
                log::debug!("joined in-flight token refresh");
                return outcome;
            }
        }

        let now = Instant::now();

        if let Some(until) = flight.backoff_until {
            if now < until {
                log::debug!("token refresh backing off after rate limit");
                return Err(RefreshError::RateLimited {
                    retry_after: Some(until - now),
                });
            }
            flight.backoff_until = None;
        }

        if let Some(last) = flight.last_attempt {
            if now.duration_since(last) < inner.cooldown {
                if let Some(outcome) = flight.last_outcome.clone() {
                    log::debug!("token refresh within cooldown, reusing last outcome");
                    return outcome;
                }
            }
        }

        flight.last_attempt = Some(now);
        flight.last_outcome = None;

        log::debug!("refreshing access token");
        let result = inner.endpoint.refresh().await;

        let mut escalation = None;
        let outcome = match result {
            Ok(expiry) => {
                self.store_tokens(expiry, Some(Instant::now()));
                inner.failures.store(0, Ordering::Release);
                log::info!("access token refreshed");
                Ok(())
            }
            Err(err) => {
                match &err {
                    RefreshError::RateLimited { retry_after } => {
                        let backoff = retry_after
                            .unwrap_or(inner.rate_limit_backoff)
                            .min(inner.max_rate_limit_backoff);
                        flight.backoff_until = Instant::now().checked_add(backoff);
                        log::warn!("token refresh rate limited, backing off {:?}", backoff);
                    }
                    RefreshError::ForceLogout => {
                        log::warn!("server requested logout during token refresh");
                        escalation = Some(TerminationReason::ForceLogout);
                    }
                    RefreshError::Unauthorized { .. } => {
                        let failures = inner.failures.fetch_add(1, Ordering::AcqRel) + 1;
                        log::warn!(
                            "token refresh rejected ({}/{})",
                            failures,
                            inner.failure_threshold
                        );
                        if failures >= inner.failure_threshold {
                            escalation = Some(TerminationReason::FailureThreshold { failures });
                        }
                    }
                    other => {
                        log::warn!("token refresh failed: {}", other);
                    }
                }
                Err(err)
            }
        };

        flight.last_outcome = Some(outcome.clone());
        inner.settled.fetch_add(1, Ordering::AcqRel);
        drop(flight);

        if let Some(reason) = escalation {
            self.escalate(reason).await;
        }

        outcome
    }

    /// Refreshes only if the access token expires within the expiry buffer.
    ///
    /// Returns `Ok(true)` if a refresh was performed or joined.
    pub async fn refresh_if_expiring(&self) -> Result<bool, RefreshError> {
        if !self.needs_refresh() {
            return Ok(false);
        }
        self.ensure_fresh_token().await.map(|()| true)
    }

    /// Starts a new session with the expiry from a login response.
    ///
    /// Resets the failure counter, the cooldown window and any rate-limit
    /// back-off.
    pub async fn record_login(&self, expiry: TokenExpiry) {
        let mut flight = self.inner.flight.lock().await;
        *flight = FlightState::default();
        self.inner.failures.store(0, Ordering::Release);
        self.store_tokens(expiry, None);
    }

    /// Forgets the session's token state.
    pub async fn clear(&self) {
        let mut flight = self.inner.flight.lock().await;
        *flight = FlightState::default();
        self.inner.failures.store(0, Ordering::Release);
        let mut tokens = self
            .inner
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *tokens = TokenState::default();
    }

    /// Returns the current token expiry.
    pub fn token_expiry(&self) -> TokenExpiry {
        self.read_tokens(|tokens| tokens.expiry)
    }

    /// Returns `true` if the access token expires within the expiry buffer.
    pub fn needs_refresh(&self) -> bool {
        self.token_expiry().expires_within(self.inner.expiry_buffer)
    }

    /// Returns when the last successful refresh completed.
    pub fn last_refresh(&self) -> Option<Instant> {
        self.read_tokens(|tokens| tokens.refreshed_at)
    }

    /// Returns `true` while a refresh call is running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.flight.try_lock().is_err()
    }

    /// Returns the number of consecutive rejected refreshes.
    pub fn failure_count(&self) -> u32 {
        self.inner.failures.load(Ordering::Acquire)
    }

    /// Returns the session terminator.
    pub fn terminator(&self) -> &SessionTerminator {
        &self.inner.terminator
    }

    async fn escalate(&self, reason: TerminationReason) {
        match self.inner.terminator.terminate(reason).await {
            Termination::Redirected => self.clear().await,
            Termination::Skipped(kind) => {
                log::debug!("session kept after {:?} on {:?} route", reason, kind);
            }
            Termination::AlreadyTerminating => {}
        }
    }

    fn store_tokens(&self, expiry: TokenExpiry, refreshed_at: Option<Instant>) {
        let mut tokens = self
            .inner
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tokens.expiry = expiry;
        tokens.refreshed_at = refreshed_at;
    }

    fn read_tokens<T>(&self, f: impl FnOnce(&TokenState) -> T) -> T {
        let tokens = self
            .inner
            .tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&tokens)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("expiry", &self.token_expiry())
            .field("failures", &self.failure_count())
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
