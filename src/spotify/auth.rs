use async_trait::async_trait;
use reqwest::{Client, Response, Url};

use crate::{config::AuthConfig, error::AuthError, types::TokenResponse};

/// The provider's token endpoint.
///
/// Implementations never retry: authorization codes are single-use and
/// providers may reject a refresh token that is presented twice.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `grant_type=authorization_code`. Non-2xx maps to [`AuthError::ExchangeFailed`].
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError>;

    /// `grant_type=refresh_token`. Non-2xx maps to [`AuthError::RefreshFailed`].
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Builds the URL the user has to visit to grant access.
///
/// Parameter order is fixed so the result is deterministic for a given
/// configuration and challenge.
pub fn authorize_url(config: &AuthConfig, code_challenge: &str) -> Result<String, AuthError> {
    let url = Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", config.scope.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
        ],
    )
    .map_err(|e| AuthError::Config(format!("invalid authorize URL: {e}")))?;
    Ok(url.into())
}

/// reqwest implementation of [`AuthApi`] against the Spotify accounts service.
pub struct SpotifyAuthClient {
    client: Client,
    client_id: String,
    redirect_uri: String,
    token_url: String,
}

impl SpotifyAuthClient {
    pub fn new(config: &AuthConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &AuthConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: config.token_url.clone(),
        }
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<Response, AuthError> {
        Ok(self.client.post(&self.token_url).form(form).send().await?)
    }
}

async fn read_token(res: Response) -> Result<TokenResponse, AuthError> {
    let body = res.text().await?;
    serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl AuthApi for SpotifyAuthClient {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError> {
        tracing::debug!("Exchanging authorization code at {}", self.token_url);
        let res = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("client_id", &self.client_id),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
                ("code_verifier", verifier),
            ])
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!("Token exchange rejected ({}): {}", status, body);
            return Err(AuthError::ExchangeFailed(status.as_u16()));
        }
        read_token(res).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        tracing::debug!("Refreshing access token at {}", self.token_url);
        let res = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
            ])
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!("Token refresh rejected ({}): {}", status, body);
            return Err(AuthError::RefreshFailed(status.as_u16()));
        }
        read_token(res).await
    }
}
