use std::sync::Arc;

use crate::{
    config::{self, AuthConfig},
    error::{AuthError, PlaybackError},
    management::{
        auth::TokenManager,
        device::DeviceSession,
        playback::{SegmentScheduler, validate},
        store::FileStore,
    },
    spotify::{
        auth::SpotifyAuthClient,
        player::{PlayerApi, SpotifyPlayerClient},
    },
    types::{PlayerEvent, Segment},
};

/// The token record, the device handle, and the pending stop of one user session.
pub struct Session {
    tokens: Arc<TokenManager>,
    devices: Arc<DeviceSession>,
    scheduler: SegmentScheduler,
}

impl Session {
    /// The scheduler draws its stop-time tokens from `tokens`.
    pub fn new(tokens: TokenManager, devices: Arc<DeviceSession>, player: Arc<dyn PlayerApi>) -> Self {
        let tokens = Arc::new(tokens);
        let scheduler = SegmentScheduler::new(player).with_token_source(tokens.clone());
        Self {
            tokens,
            devices,
            scheduler,
        }
    }

    /// Wires the Spotify clients and the on-disk store from the environment.
    pub async fn from_env() -> Result<Self, String> {
        let auth_config = AuthConfig::from_env()?;
        let tokens = TokenManager::new(
            auth_config.clone(),
            Arc::new(SpotifyAuthClient::new(&auth_config)),
            Arc::new(FileStore::default_location()),
        );
        tokens.restore().await.map_err(|e| e.to_string())?;

        let player = Arc::new(SpotifyPlayerClient::new(config::spotify_player_url()));
        Ok(Self::new(tokens, Arc::new(DeviceSession::new()), player))
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn devices(&self) -> &Arc<DeviceSession> {
        &self.devices
    }

    pub fn scheduler(&self) -> &SegmentScheduler {
        &self.scheduler
    }

    /// Plays `segment` on the current device with a valid access token.
    ///
    /// The segment and device are checked before a token is requested, so
    /// invalid input never causes a refresh either.
    pub async fn play_segment(&self, segment: &Segment) -> Result<(), PlaybackError> {
        let device = self.devices.current_device();
        validate(segment, device.as_ref())?;

        let token = self.tokens.get_valid_access_token().await?;
        self.scheduler
            .play_segment(segment, &token, device.as_ref())
            .await
    }

    /// Pauses immediately. The pending stop is dropped even if no token can be obtained.
    pub async fn stop_segment(&self) -> Result<(), PlaybackError> {
        let token = match self.tokens.get_valid_access_token().await {
            Ok(token) => token,
            Err(e) => {
                self.scheduler.cancel_pending();
                return Err(e.into());
            }
        };
        let device = self.devices.current_device();
        self.scheduler.stop_segment(&token, device.as_ref()).await
    }

    /// Routes a playback client event through the device session.
    ///
    /// A rejected token ends the session: the stored credentials are removed
    /// and the caller has to authorize again.
    pub async fn handle_player_event(&self, event: PlayerEvent) -> Result<(), AuthError> {
        match self.devices.handle_event(event) {
            Err(AuthError::AuthRejected(message)) => {
                self.scheduler.cancel_pending();
                self.tokens.logout().await?;
                Err(AuthError::AuthRejected(message))
            }
            other => other,
        }
    }
}
