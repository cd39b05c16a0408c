use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;

use crate::{
    api::{CallbackOutcome, CallbackState},
    cli::load_session,
    error, info, server, success, warning,
};

const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn auth() {
    let session = load_session().await;
    let tokens = Arc::clone(session.tokens());

    let listener = match server::bind().await {
        Ok(listener) => listener,
        Err(e) => error!("Cannot start callback server: {}", e),
    };

    let auth_url = match tokens.begin_authorization().await {
        Ok(url) => url,
        Err(e) => error!("Cannot start authorization: {}", e),
    };

    let (tx, mut rx) = mpsc::channel(1);
    let state = CallbackState {
        tokens,
        outcome: tx,
    };
    let server = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::warn!("Callback server stopped: {}", e);
        }
    });

    if webbrowser::open(&auth_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }
    info!("Waiting for authorization in the browser...");

    let outcome = tokio::time::timeout(AUTH_TIMEOUT, rx.recv()).await;
    server.abort();

    match outcome {
        Ok(Some(CallbackOutcome::Authorized)) => success!("Authentication successful!"),
        Ok(Some(CallbackOutcome::Denied(reason))) => error!("Authorization denied: {}", reason),
        Ok(Some(CallbackOutcome::Failed(reason))) => error!("Authentication failed: {}", reason),
        Ok(None) | Err(_) => error!("Authentication failed or timed out."),
    }
}

pub async fn logout() {
    let session = load_session().await;
    session.scheduler().cancel_pending();

    match session.tokens().logout().await {
        Ok(()) => success!("Logged out."),
        Err(e) => error!("Failed to remove stored credentials: {}", e),
    }
}
