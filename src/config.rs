//! Configuration management for the segment player.
//!
//! This module handles loading and accessing configuration values from
//! environment variables and `.env` files. It provides a centralized way to
//! manage the Spotify application credentials, endpoint URLs, and the address
//! of the local callback server.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (endpoints and scope only)

use std::{env, path::PathBuf};

pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SCOPE: &str = "user-read-private user-read-email streaming user-read-playback-state user-modify-playback-state";

/// Returns the platform-specific data directory used by segcli.
///
/// - Linux: `~/.local/share/segcli`
/// - macOS: `~/Library/Application Support/segcli`
/// - Windows: `%LOCALAPPDATA%/segcli`
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("segcli");
    path
}

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the data directory if it doesn't exist. A missing `.env` file is
/// not an error: every value can also come from the process environment.
/// Variables already present in the environment are never overridden.
///
/// # Errors
///
/// Returns an error string if the directory cannot be created or if an
/// existing `.env` file cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn required(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} must be set"))
}

fn with_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Returns the bind address of the local OAuth callback server.
///
/// Read from `SERVER_ADDRESS`, e.g. `127.0.0.1:5173`. The port must match the
/// one in the registered redirect URI.
pub fn server_addr() -> Result<String, String> {
    required("SERVER_ADDRESS")
}

/// Returns the Spotify application client ID (`SPOTIFY_API_AUTH_CLIENT_ID`).
///
/// PKCE clients never need the client secret, so there is no accessor for it.
pub fn spotify_client_id() -> Result<String, String> {
    required("SPOTIFY_API_AUTH_CLIENT_ID")
}

/// Returns the OAuth redirect URI (`SPOTIFY_API_REDIRECT_URI`).
///
/// This must match the redirect URI registered in the Spotify application
/// settings, e.g. `http://127.0.0.1:5173/callback`.
pub fn spotify_redirect_uri() -> Result<String, String> {
    required("SPOTIFY_API_REDIRECT_URI")
}

/// Returns the requested permission scope (`SPOTIFY_API_AUTH_SCOPE`).
///
/// Defaults to the scopes needed for streaming and remote playback control.
pub fn spotify_scope() -> String {
    with_default("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE)
}

/// Returns the authorization endpoint (`SPOTIFY_API_AUTH_URL`).
pub fn spotify_apiauth_url() -> String {
    with_default("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL)
}

/// Returns the token endpoint used for code exchange and refresh
/// (`SPOTIFY_API_TOKEN_URL`).
pub fn spotify_apitoken_url() -> String {
    with_default("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL)
}

/// Returns the Web API base URL (`SPOTIFY_API_URL`).
pub fn spotify_apiurl() -> String {
    with_default("SPOTIFY_API_URL", DEFAULT_API_URL)
}

/// Returns the player control endpoint derived from the Web API base URL.
pub fn spotify_player_url() -> String {
    format!("{}/me/player", spotify_apiurl().trim_end_matches('/'))
}

/// Everything the token lifecycle needs to talk to the authorization server.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub authorize_url: String,
    pub token_url: String,
}

impl AuthConfig {
    /// Collects the authorization settings from the environment.
    ///
    /// # Errors
    ///
    /// Fails when the client ID or the redirect URI is not configured.
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            client_id: spotify_client_id()?,
            redirect_uri: spotify_redirect_uri()?,
            scope: spotify_scope(),
            authorize_url: spotify_apiauth_url(),
            token_url: spotify_apitoken_url(),
        })
    }
}
