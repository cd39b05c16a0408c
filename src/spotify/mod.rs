//! # Spotify Integration Module
//!
//! HTTP clients for the parts of the Spotify Web API segcli talks to. Each
//! client sits behind a small trait so the token manager and the segment
//! scheduler can be driven by fakes in tests.
//!
//! ```text
//! Management Layer (TokenManager, SegmentScheduler, Session)
//!          ↓
//! Spotify Integration Layer
//!     ├── Authentication (PKCE authorize URL, token exchange/refresh)
//!     ├── Player (transfer, play, pause, device list)
//!     └── Devices (Connect device selection and polling)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - [`auth::AuthApi`] and its reqwest implementation against the
//!   accounts service token endpoint. Builds the authorize URL for the
//!   browser redirect.
//! - [`player`] - [`player::PlayerApi`] for `PUT /me/player`,
//!   `PUT /me/player/play` and `PUT /me/player/pause`, plus the
//!   `GET /me/player/devices` listing.
//! - [`devices`] - Chooses a Connect device and turns polling results into
//!   the `ready` / `not_ready` events the device session consumes.
//!
//! ## Errors
//!
//! Clients never retry. Non-2xx responses map to the status-carrying
//! variants of [`crate::error::AuthError`] and [`crate::error::PlaybackError`];
//! transport problems surface as their `Transport` variants.

pub mod auth;
pub mod devices;
pub mod player;
