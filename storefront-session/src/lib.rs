//! Storefront session client library
//!
//! Keeps a cookie-based storefront session alive across concurrent API
//! requests: short-lived access tokens are refreshed before they expire and
//! after a 401, with at most one refresh call in flight; unrecoverable
//! sessions end in a single notice and a redirect to the login page.

pub mod auth;
pub mod error;
pub mod host;
pub mod policy;
pub mod route;

mod client;
mod config;
mod request;
mod response;

pub use client::*;
pub use config::SessionConfig;
pub use request::ApiRequest;
pub use response::ApiResponse;
