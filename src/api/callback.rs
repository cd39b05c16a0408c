use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::mpsc;

use crate::management::TokenManager;

/// How an authorization redirect ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Authorized,
    /// The user or the provider refused; carries the `error` parameter.
    Denied(String),
    Failed(String),
}

#[derive(Clone)]
pub struct CallbackState {
    pub tokens: Arc<TokenManager>,
    pub outcome: mpsc::Sender<CallbackOutcome>,
}

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(state): Extension<CallbackState>,
) -> Html<&'static str> {
    if let Some(reason) = params.get("error") {
        tracing::warn!("Authorization denied: {}", reason);
        let _ = state
            .outcome
            .send(CallbackOutcome::Denied(reason.clone()))
            .await;
        return Html("<h4>Authorization denied.</h4>");
    }

    let Some(code) = params.get("code") else {
        return Html("<h4>Missing authorization code.</h4>");
    };

    match state.tokens.complete_authorization(code).await {
        Ok(_) => {
            let _ = state.outcome.send(CallbackOutcome::Authorized).await;
            Html("<h2>Authentication successful.</h2><p>Close browser window.</p>")
        }
        Err(e) => {
            tracing::warn!("Token exchange failed: {}", e);
            let _ = state
                .outcome
                .send(CallbackOutcome::Failed(e.to_string()))
                .await;
            Html("<h4>Login failed.</h4>")
        }
    }
}
