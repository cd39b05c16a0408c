use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// The persisted credential set for the signed-in user.
///
/// `expires_at` is a Unix timestamp in milliseconds computed as
/// `issued_at + expires_in * 1000`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl TokenRecord {
    pub fn issued(access_token: String, refresh_token: String, expires_in: u64, now_ms: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: now_ms + (expires_in as i64) * 1000,
        }
    }

    /// Valid while `now` is before the expiry minus the safety margin.
    pub fn is_valid_at(&self, now_ms: i64, margin_ms: i64) -> bool {
        now_ms < self.expires_at - margin_ms
    }
}

/// Verifier kept between the authorization redirect and the code exchange.
#[derive(Debug, Clone)]
pub struct PkceSession {
    pub verifier: String,
}

/// Token endpoint payload. `refresh_token` is absent on most refresh responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub device_id: String,
    pub ready: bool,
}

/// A bookmarked range of a track, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub track_uri: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub track_duration_ms: Option<u64>,
}

impl Segment {
    pub fn new(track_uri: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            track_uri: track_uri.into(),
            start_ms,
            end_ms,
            track_duration_ms: None,
        }
    }

    pub fn with_track_duration(mut self, track_duration_ms: u64) -> Self {
        self.track_duration_ms = Some(track_duration_ms);
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Events emitted by the playback client that owns the remote device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    AuthenticationError { message: String },
    AccountError { message: String },
    InitializationError { message: String },
}

/// Notifications broadcast by the segment scheduler.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    SegmentStarted { segment: Segment },
    SegmentEnded { segment: Segment },
    StopFailed { segment: Segment, error: String },
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferPlaybackRequest {
    pub device_ids: Vec<String>,
    pub play: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartPlaybackRequest {
    pub uris: Vec<String>,
    pub position_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<ConnectDevice>,
}

/// A Spotify Connect device as listed by `/me/player/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectDevice {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
    pub volume_percent: Option<u32>,
}

#[derive(Tabled)]
pub struct DeviceTableRow {
    pub name: String,
    pub kind: String,
    pub active: String,
    pub id: String,
}

#[derive(Tabled)]
pub struct StatusTableRow {
    pub key: String,
    pub value: String,
}
