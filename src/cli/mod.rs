//! # CLI Module
//!
//! User-facing commands. Each command builds a [`Session`] from the
//! environment, drives it, and reports through the colored output macros.
//! Errors end the process here and only here; the library layers below
//! return them.
//!
//! ## Commands
//!
//! - [`auth`] - Runs the PKCE authorization in the browser and waits for
//!   the local callback server to receive the redirect.
//! - [`logout`] - Forgets the stored tokens and verifier.
//! - [`status`] - Shows authorization state, token expiry and device.
//! - [`list_devices`] - Lists the account's Spotify Connect devices.
//! - [`play`] - Plays a bounded segment of a track, optionally looping.
//! - [`stop`] - Pauses playback immediately.
//!
//! ## Usage Patterns
//!
//! ```bash
//! segcli auth
//! segcli devices
//! segcli play spotify:track:4uLU6hMCjMI75M1A2tKUQC --start 0:30 --end 1:05 --loop
//! segcli stop
//! ```

mod auth;
mod devices;
mod play;
mod status;

pub use auth::auth;
pub use auth::logout;
pub use devices::list_devices;
pub use play::PlayOptions;
pub use play::play;
pub use play::stop;
pub use status::status;

use crate::{error, error::AuthError, management::Session};

pub(crate) async fn load_session() -> Session {
    match Session::from_env().await {
        Ok(session) => session,
        Err(e) => error!("Cannot set up session: {}", e),
    }
}

pub(crate) fn exit_with_auth_error(e: AuthError) -> ! {
    if e.requires_reauthorization() && !matches!(e, AuthError::Unauthenticated) {
        error!("{}. Run `segcli auth` to sign in again.", e)
    } else {
        error!("{}", e)
    }
}
