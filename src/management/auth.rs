use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    config::AuthConfig,
    error::AuthError,
    management::store::{
        KEY_ACCESS_TOKEN, KEY_CODE_VERIFIER, KEY_EXPIRES_AT, KEY_REFRESH_TOKEN, KeyValueStore,
    },
    spotify::auth::{AuthApi, authorize_url},
    types::{PkceSession, TokenRecord},
    utils,
};

/// Tokens are treated as expired this long before their literal expiry.
pub const EXPIRY_MARGIN_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AwaitingExchange,
    Authenticated,
    Refreshing,
}

/// Owns the PKCE authorization flow and the persisted [`TokenRecord`].
///
/// At most one refresh request is in flight at a time. Callers that find
/// the token stale while another refresh is pending wait for it and reuse
/// its outcome instead of spending the refresh token a second time.
pub struct TokenManager {
    config: AuthConfig,
    api: Arc<dyn AuthApi>,
    store: Arc<dyn KeyValueStore>,
    state: StdMutex<AuthState>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(config: AuthConfig, api: Arc<dyn AuthApi>, store: Arc<dyn KeyValueStore>) -> Self {
        TokenManager {
            config,
            api,
            store,
            state: StdMutex::new(AuthState::Unauthenticated),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Derives the state from what a previous process left in the store.
    pub async fn restore(&self) -> Result<AuthState, AuthError> {
        let state = if self.current_record().await?.is_some() {
            AuthState::Authenticated
        } else if self.pkce_session().await?.is_some() {
            AuthState::AwaitingExchange
        } else {
            AuthState::Unauthenticated
        };
        self.set_state(state);
        Ok(state)
    }

    pub fn state(&self) -> AuthState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: AuthState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current != state {
            tracing::debug!("Auth state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    /// Starts a new authorization round and returns the URL to navigate to.
    ///
    /// Persists a fresh verifier; any previous one is overwritten. No network call.
    pub async fn begin_authorization(&self) -> Result<String, AuthError> {
        let (verifier, challenge) = utils::generate_challenge();
        let url = authorize_url(&self.config, &challenge)?;

        self.store.set(KEY_CODE_VERIFIER, &verifier).await?;
        self.set_state(AuthState::AwaitingExchange);
        tracing::info!("Authorization started, waiting for redirect");
        Ok(url)
    }

    /// Exchanges the authorization `code` from the redirect for a token.
    ///
    /// Codes are single-use, so a rejected exchange is never retried and the
    /// manager falls back to `Unauthenticated`.
    ///
    /// # Arguments
    ///
    /// * `code` - The `code` query parameter Spotify appended to the redirect URI
    ///
    /// # Returns
    ///
    /// The persisted [`TokenRecord`]. The stored verifier is removed whether
    /// the exchange succeeds or not.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingVerifier`] when no authorization round is pending
    /// - [`AuthError::ExchangeFailed`] when the accounts service rejects the code
    /// - [`AuthError::MalformedResponse`] when the response carries no refresh token
    pub async fn complete_authorization(&self, code: &str) -> Result<TokenRecord, AuthError> {
        let Some(pkce) = self.pkce_session().await? else {
            self.set_state(AuthState::Unauthenticated);
            return Err(AuthError::MissingVerifier);
        };

        let response = match self.api.exchange_code(code, &pkce.verifier).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Authorization code exchange failed: {}", e);
                self.store.remove(KEY_CODE_VERIFIER).await?;
                self.set_state(AuthState::Unauthenticated);
                return Err(e);
            }
        };

        let Some(refresh_token) = response.refresh_token else {
            self.store.remove(KEY_CODE_VERIFIER).await?;
            self.set_state(AuthState::Unauthenticated);
            return Err(AuthError::MalformedResponse(
                "exchange response has no refresh_token".to_string(),
            ));
        };

        let record = TokenRecord::issued(
            response.access_token,
            refresh_token,
            response.expires_in,
            utils::now_millis(),
        );
        self.write_record(&record).await?;
        self.store.remove(KEY_CODE_VERIFIER).await?;
        self.set_state(AuthState::Authenticated);
        tracing::info!("Authorization completed");
        Ok(record)
    }

    /// Returns an access token that is valid for at least [`EXPIRY_MARGIN_MS`].
    ///
    /// A valid stored token is returned without any network call; a stale
    /// one is refreshed first. Concurrent callers share a single refresh.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when nothing is stored or the
    /// refresh token was rejected. Transport failures during a refresh are
    /// passed through and leave the stored record untouched.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let session = Session::from_env().await?;
    /// let token = session.tokens().get_valid_access_token().await?;
    /// let devices = SpotifyPlayerClient::from_env().devices(&token).await?;
    /// ```
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        let Some(record) = self.current_record().await? else {
            self.set_state(AuthState::Unauthenticated);
            return Err(AuthError::Unauthenticated);
        };

        if record.is_valid_at(utils::now_millis(), EXPIRY_MARGIN_MS) {
            return Ok(record.access_token);
        }

        tracing::debug!("Access token stale, refreshing");
        self.refresh_after(Some(record)).await
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// A rejected refresh clears the stored record and yields
    /// [`AuthError::Unauthenticated`]; the user has to authorize again.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let seen = self.current_record().await?;
        self.refresh_after(seen).await
    }

    async fn refresh_after(&self, seen: Option<TokenRecord>) -> Result<String, AuthError> {
        let _in_flight = self.refresh_lock.lock().await;

        let Some(current) = self.current_record().await? else {
            self.set_state(AuthState::Unauthenticated);
            return Err(AuthError::Unauthenticated);
        };

        // Someone else refreshed while we were waiting for the lock.
        if seen.as_ref() != Some(&current)
            && current.is_valid_at(utils::now_millis(), EXPIRY_MARGIN_MS)
        {
            return Ok(current.access_token);
        }

        self.set_state(AuthState::Refreshing);
        match self.api.refresh(&current.refresh_token).await {
            Ok(response) => {
                let record = TokenRecord::issued(
                    response.access_token,
                    response.refresh_token.unwrap_or(current.refresh_token),
                    response.expires_in,
                    utils::now_millis(),
                );
                self.write_record(&record).await?;
                self.set_state(AuthState::Authenticated);
                tracing::info!("Access token refreshed");
                Ok(record.access_token)
            }
            Err(AuthError::RefreshFailed(status)) => {
                tracing::warn!(
                    "{}, clearing stored session",
                    AuthError::RefreshFailed(status)
                );
                self.clear_record().await?;
                self.set_state(AuthState::Unauthenticated);
                Err(AuthError::Unauthenticated)
            }
            Err(e) => {
                tracing::warn!("Token refresh did not complete: {}", e);
                self.set_state(AuthState::Authenticated);
                Err(e)
            }
        }
    }

    /// Forgets the token record and any pending PKCE verifier.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.clear_record().await?;
        self.store.remove(KEY_CODE_VERIFIER).await?;
        self.set_state(AuthState::Unauthenticated);
        Ok(())
    }

    /// The persisted record, if all of its parts are present.
    ///
    /// The three fields are read in one store call, so a record rewritten
    /// by a concurrent refresh is seen either entirely old or entirely new.
    pub async fn current_record(&self) -> Result<Option<TokenRecord>, AuthError> {
        let values = self
            .store
            .get_many(&[KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_EXPIRES_AT])
            .await?;

        let [Some(access_token), Some(refresh_token), Some(expires_at)] =
            <[Option<String>; 3]>::try_from(values).unwrap_or_default()
        else {
            return Ok(None);
        };

        let expires_at = expires_at.parse::<i64>().unwrap_or_else(|_| {
            tracing::warn!("Stored token expiry '{}' is not a timestamp", expires_at);
            0
        });

        Ok(Some(TokenRecord {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    pub async fn pkce_session(&self) -> Result<Option<PkceSession>, AuthError> {
        Ok(self
            .store
            .get(KEY_CODE_VERIFIER)
            .await?
            .map(|verifier| PkceSession { verifier }))
    }

    async fn write_record(&self, record: &TokenRecord) -> Result<(), AuthError> {
        let expires_at = record.expires_at.to_string();
        self.store
            .set_many(&[
                (KEY_ACCESS_TOKEN, &record.access_token),
                (KEY_REFRESH_TOKEN, &record.refresh_token),
                (KEY_EXPIRES_AT, &expires_at),
            ])
            .await?;
        Ok(())
    }

    async fn clear_record(&self) -> Result<(), AuthError> {
        self.store
            .remove_many(&[KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_EXPIRES_AT])
            .await?;
        Ok(())
    }
}

/// Anything that can hand out a currently valid access token.
///
/// Long-running tasks hold one of these instead of a token string, so a
/// token that expires while they wait is refreshed on next use.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.get_valid_access_token().await
    }
}
