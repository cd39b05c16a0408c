//! # API Module
//!
//! HTTP endpoints served by the short-lived local server that runs while
//! `segcli auth` waits for Spotify to redirect the browser back.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the authorization redirect. A `code` parameter
//!   is exchanged through the shared [`crate::management::TokenManager`];
//!   an `error` parameter is reported as a denial. Either way the waiting
//!   command is told through the [`CallbackState`] channel.
//! - [`health`] - Returns status, version and the current authorization
//!   state.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Extension, Router, routing::get};
//! use segcli::api::{CallbackState, callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health))
//!     .layer(Extension(state));
//! ```

mod callback;
mod health;

pub use callback::CallbackOutcome;
pub use callback::CallbackState;
pub use callback::callback;
pub use health::health;
