use std::{net::SocketAddr, str::FromStr};

use axum::{Extension, Router, routing::get};
use tokio::net::TcpListener;

use crate::{
    api::{self, CallbackState},
    config,
};

pub fn router(state: CallbackState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback))
        .layer(Extension(state))
}

/// Binds the callback listener on `SERVER_ADDRESS`.
pub async fn bind() -> Result<TcpListener, String> {
    let addr = SocketAddr::from_str(&config::server_addr()?)
        .map_err(|e| format!("Failed to parse server address: {}", e))?;

    TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))
}

pub async fn serve(listener: TcpListener, state: CallbackState) -> Result<(), String> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| e.to_string())
}
