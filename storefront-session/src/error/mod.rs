//! Error types

mod api;
mod refresh;
mod request;

pub use api::*;
pub use refresh::*;
pub use request::*;
