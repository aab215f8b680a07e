//! Authentication session maintenance

mod cookie;
mod coordinator;
mod endpoint;
mod monitor;
mod termination;
mod token;

pub use cookie::CookieSource;
pub use cookie::JarCookies;
pub use cookie::header_has_cookie;
pub use coordinator::RefreshCoordinator;
pub(crate) use endpoint::ExpiryBody;
pub use endpoint::FORCE_LOGOUT;
pub use endpoint::HttpRefreshEndpoint;
pub use endpoint::RefreshEndpoint;
pub use endpoint::interpret_response;
pub use monitor::CheckOutcome;
pub use monitor::ScheduledTask;
pub use monitor::SessionMonitor;
pub use monitor::SkipReason;
pub use termination::SessionTerminator;
pub use termination::Termination;
pub use termination::TerminationReason;
pub use token::TokenExpiry;
