use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Table;

use crate::{
    cli::load_session, error, info, spotify::player::SpotifyPlayerClient,
    types::DeviceTableRow,
};

pub async fn list_devices() {
    let session = load_session().await;
    let token = match session.tokens().get_valid_access_token().await {
        Ok(token) => token,
        Err(e) => error!("{}", e),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_message("Fetching devices...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );

    let devices = SpotifyPlayerClient::from_env().devices(&token).await;
    pb.finish_and_clear();

    let devices = match devices {
        Ok(devices) => devices,
        Err(e) => error!("Failed to list devices: {}", e),
    };

    if devices.is_empty() {
        info!("No devices available. Open Spotify on a device to make it visible.");
        return;
    }

    let rows: Vec<DeviceTableRow> = devices
        .into_iter()
        .map(|d| DeviceTableRow {
            name: d.name,
            kind: d.kind,
            active: if d.is_active { "yes" } else { "" }.to_string(),
            id: d.id.unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("{}", Table::new(rows));
}
