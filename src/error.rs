//! Error types for the session and playback engine.
//!
//! Authorization problems are reported as [`AuthError`], playback sequencing
//! problems as [`PlaybackError`]. Persistence failures from the key-value
//! store surface as [`StoreError`] wrapped in either of the two.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by the token lifecycle and the remote device session.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The PKCE verifier did not survive the redirect round-trip.
    #[error("no PKCE code verifier stored, restart the authorization flow")]
    MissingVerifier,

    #[error("authorization code exchange failed with status {0}")]
    ExchangeFailed(u16),

    #[error("token refresh failed with status {0}")]
    RefreshFailed(u16),

    #[error("not authenticated, run `segcli auth` first")]
    Unauthenticated,

    /// The playback client rejected the access token.
    #[error("authentication rejected by the player: {0}")]
    AuthRejected(String),

    /// The account cannot use remote playback (usually no Premium subscription).
    #[error("account not eligible for playback: {0}")]
    AccountIneligible(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while starting, bounding, or stopping a segment.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no ready playback device")]
    DeviceNotReady,

    #[error("invalid segment range: start {start_ms} ms is not before end {end_ms} ms")]
    InvalidRange { start_ms: u64, end_ms: u64 },

    #[error("segment end {end_ms} ms exceeds track duration {track_duration_ms} ms")]
    RangeExceedsTrack { end_ms: u64, track_duration_ms: u64 },

    #[error("playback transfer failed with status {0}")]
    TransferFailed(u16),

    #[error("play request failed with status {0}")]
    PlayFailed(u16),

    #[error("pause request failed with status {0}")]
    PauseFailed(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AuthError {
    /// Errors after which the stored session is gone and the user must log in again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::MissingVerifier
                | AuthError::ExchangeFailed(_)
                | AuthError::RefreshFailed(_)
                | AuthError::Unauthenticated
                | AuthError::AuthRejected(_)
        )
    }
}
