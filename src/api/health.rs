use axum::{Extension, response::Json};
use serde_json::{Value, json};

use crate::{api::CallbackState, management::AuthState};

pub async fn health(Extension(state): Extension<CallbackState>) -> Json<Value> {
    let auth = match state.tokens.state() {
        AuthState::Unauthenticated => "unauthenticated",
        AuthState::AwaitingExchange => "awaiting_exchange",
        AuthState::Authenticated => "authenticated",
        AuthState::Refreshing => "refreshing",
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "auth": auth,
    }))
}
