//! The embedding application
//!
//! The session layer never touches UI state directly. Everything it needs
//! from the application (where the user is, who is logged in, how to show
//! a notice, how to navigate) goes through [`SessionHost`].

use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;
use tokio::time::Instant;

/// A user-facing notice raised by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The session could not be recovered and the user must log in again.
    SessionExpired,
}

impl Notice {
    /// Returns the text to display.
    pub fn message(&self) -> &'static str {
        match self {
            Self::SessionExpired => "Your session has expired. Please log in again.",
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Application state and navigation, as seen by the session layer.
///
/// Implementations must be cheap to call; the session layer calls
/// `current_path` on every failed request and every background check.
pub trait SessionHost: Send + Sync {
    /// Returns the current client navigation path (e.g. `/admin/orders`).
    fn current_path(&self) -> String;

    /// Navigates to the given client path.
    fn navigate(&self, path: &str);

    /// Returns `true` if user state is populated.
    fn is_authenticated(&self) -> bool;

    /// Returns when user state was last populated.
    fn user_loaded_at(&self) -> Option<Instant>;

    /// Populates user state after login.
    fn set_user(&self, user: Value);

    /// Clears user state.
    fn clear_user(&self);

    /// Clears any error state shown by the application.
    fn clear_error(&self);

    /// Shows a notice to the user.
    fn notify(&self, notice: Notice);
}

/// A thread-safe, in-memory [`SessionHost`].
///
/// Records navigations and notices so headless clients and tests can
/// inspect what the session layer asked the application to do.
///
/// # Example
///
/// ```
/// use storefront_session::host::{MemoryHost, SessionHost};
///
/// let host = MemoryHost::at("/admin/orders");
/// host.navigate("/login");
/// assert_eq!(host.current_path(), "/login");
/// assert_eq!(host.navigations(), vec!["/login".to_string()]);
/// ```
#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<MemoryHostState>,
}

#[derive(Debug, Default)]
struct MemoryHostState {
    path: String,
    user: Option<Value>,
    user_loaded_at: Option<Instant>,
    error: Option<String>,
    notices: Vec<Notice>,
    navigations: Vec<String>,
}

impl MemoryHost {
    /// Creates a host positioned at `/` with no user.
    pub fn new() -> Self {
        Self::at("/")
    }

    /// Creates a host positioned at the given path with no user.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryHostState {
                path: path.into(),
                ..Default::default()
            }),
        }
    }

    /// Creates a host positioned at the given path with a logged-in user.
    ///
    /// The user counts as loaded long ago, so the background check is not
    /// held back by the settle window.
    pub fn with_user(path: impl Into<String>, user: Value) -> Self {
        let host = Self::at(path);
        {
            let mut state = host.lock();
            state.user = Some(user);
        }
        host
    }

    /// Moves to a new path without recording a navigation.
    pub fn set_path(&self, path: impl Into<String>) {
        self.lock().path = path.into();
    }

    /// Records an application error message.
    pub fn set_error(&self, error: impl Into<String>) {
        self.lock().error = Some(error.into());
    }

    /// Returns the current user, if any.
    pub fn user(&self) -> Option<Value> {
        self.lock().user.clone()
    }

    /// Returns the current application error, if any.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Returns all notices shown so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().notices.clone()
    }

    /// Returns all navigations performed so far.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHostState> {
        // state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHost for MemoryHost {
    fn current_path(&self) -> String {
        self.lock().path.clone()
    }

    fn navigate(&self, path: &str) {
        let mut state = self.lock();
        state.path = path.to_string();
        state.navigations.push(path.to_string());
    }

    fn is_authenticated(&self) -> bool {
        self.lock().user.is_some()
    }

    fn user_loaded_at(&self) -> Option<Instant> {
        self.lock().user_loaded_at
    }

    fn set_user(&self, user: Value) {
        let mut state = self.lock();
        state.user = Some(user);
        state.user_loaded_at = Some(Instant::now());
    }

    fn clear_user(&self) {
        let mut state = self.lock();
        state.user = None;
        state.user_loaded_at = None;
    }

    fn clear_error(&self) {
        self.lock().error = None;
    }

    fn notify(&self, notice: Notice) {
        self.lock().notices.push(notice);
    }
}
