use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_LENGTH};

use crate::{
    config,
    error::PlaybackError,
    types::{ConnectDevice, DevicesResponse, StartPlaybackRequest, TransferPlaybackRequest},
};

/// Remote playback control, all calls authorized with a bearer token.
#[async_trait]
pub trait PlayerApi: Send + Sync {
    /// Moves playback to `device_id` without starting it.
    async fn transfer(&self, token: &str, device_id: &str) -> Result<(), PlaybackError>;

    /// Starts `track_uri` at `position_ms` on `device_id`.
    async fn play(
        &self,
        token: &str,
        device_id: &str,
        track_uri: &str,
        position_ms: u64,
    ) -> Result<(), PlaybackError>;

    async fn pause(&self, token: &str, device_id: &str) -> Result<(), PlaybackError>;
}

pub struct SpotifyPlayerClient {
    client: Client,
    player_url: String,
}

impl SpotifyPlayerClient {
    /// Client for `{SPOTIFY_API_URL}/me/player`.
    pub fn from_env() -> Self {
        Self::new(config::spotify_player_url())
    }

    pub fn new(player_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            player_url: player_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Lists the Connect devices currently visible to the account.
    ///
    /// Returns the raw status on failure so callers can tell a rejected
    /// token (401) from an ineligible account (403).
    pub async fn devices(&self, token: &str) -> Result<Vec<ConnectDevice>, DeviceListError> {
        let res = self
            .client
            .get(format!("{}/devices", self.player_url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(DeviceListError::Status { status, message });
        }

        Ok(res.json::<DevicesResponse>().await?.devices)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceListError {
    #[error("device listing failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
impl PlayerApi for SpotifyPlayerClient {
    async fn transfer(&self, token: &str, device_id: &str) -> Result<(), PlaybackError> {
        let res = self
            .client
            .put(&self.player_url)
            .bearer_auth(token)
            .json(&TransferPlaybackRequest {
                device_ids: vec![device_id.to_string()],
                play: false,
            })
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(PlaybackError::TransferFailed(res.status().as_u16()));
        }
        Ok(())
    }

    async fn play(
        &self,
        token: &str,
        device_id: &str,
        track_uri: &str,
        position_ms: u64,
    ) -> Result<(), PlaybackError> {
        let res = self
            .client
            .put(format!("{}/play", self.player_url))
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .json(&StartPlaybackRequest {
                uris: vec![track_uri.to_string()],
                position_ms,
            })
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(PlaybackError::PlayFailed(res.status().as_u16()));
        }
        Ok(())
    }

    async fn pause(&self, token: &str, device_id: &str) -> Result<(), PlaybackError> {
        let res = self
            .client
            .put(format!("{}/pause", self.player_url))
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(PlaybackError::PauseFailed(res.status().as_u16()));
        }
        Ok(())
    }
}
