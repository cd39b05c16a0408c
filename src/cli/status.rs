use chrono::{DateTime, Local};
use tabled::Table;

use crate::{
    cli::load_session,
    error,
    management::{AuthState, EXPIRY_MARGIN_MS},
    spotify::{devices::pick_device, player::SpotifyPlayerClient},
    types::StatusTableRow,
    utils,
};

fn row(key: &str, value: impl Into<String>) -> StatusTableRow {
    StatusTableRow {
        key: key.to_string(),
        value: value.into(),
    }
}

fn format_expiry(expires_at: i64) -> String {
    DateTime::from_timestamp_millis(expires_at)
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| expires_at.to_string())
}

pub async fn status() {
    let session = load_session().await;
    let tokens = session.tokens();

    let record = match tokens.current_record().await {
        Ok(record) => record,
        Err(e) => error!("Cannot read stored session: {}", e),
    };

    let state = match tokens.state() {
        AuthState::Unauthenticated => "not authenticated",
        AuthState::AwaitingExchange => "waiting for authorization",
        AuthState::Authenticated => "authenticated",
        AuthState::Refreshing => "refreshing",
    };

    let mut rows = vec![row("State", state)];

    match &record {
        Some(record) => {
            let valid = record.is_valid_at(utils::now_millis(), EXPIRY_MARGIN_MS);
            rows.push(row(
                "Access token",
                if valid { "valid" } else { "expired" },
            ));
            rows.push(row("Expires", format_expiry(record.expires_at)));

            let device = if valid {
                match SpotifyPlayerClient::from_env()
                    .devices(&record.access_token)
                    .await
                {
                    Ok(devices) => pick_device(&devices, None)
                        .map(|d| format!("{} ({})", d.name, d.kind))
                        .unwrap_or_else(|| "none available".to_string()),
                    Err(e) => {
                        tracing::debug!("Device lookup failed: {}", e);
                        "unknown".to_string()
                    }
                }
            } else {
                "unknown".to_string()
            };
            rows.push(row("Device", device));
        }
        None => rows.push(row("Access token", "none")),
    }

    println!("{}", Table::new(rows));
}
