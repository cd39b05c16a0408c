//! Connect device discovery.
//!
//! A command-line process cannot host a playback client itself, so it
//! watches the account's Spotify Connect devices instead and reports the
//! chosen one through the same `ready` / `not_ready` events a player SDK
//! would emit.

use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    management::TokenSource,
    spotify::player::{DeviceListError, SpotifyPlayerClient},
    types::{ConnectDevice, PlayerEvent},
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Chooses the device to play on.
///
/// With a name, only a case-insensitive name match is accepted. Without one,
/// the active device wins, then the first unrestricted one. Devices without
/// an id cannot be addressed and are skipped.
pub fn pick_device<'a>(devices: &'a [ConnectDevice], name: Option<&str>) -> Option<&'a ConnectDevice> {
    let mut usable = devices.iter().filter(|d| d.id.is_some() && !d.is_restricted);
    match name {
        Some(name) => usable.find(|d| d.name.eq_ignore_ascii_case(name)),
        None => {
            let usable: Vec<&ConnectDevice> = usable.collect();
            usable
                .iter()
                .find(|d| d.is_active)
                .or_else(|| usable.first())
                .copied()
        }
    }
}

/// Events needed to move from the previously ready device to the one found now.
pub fn transition(previous: Option<&str>, found: Option<&str>) -> Vec<PlayerEvent> {
    match (previous, found) {
        (None, None) => vec![],
        (None, Some(id)) => vec![PlayerEvent::Ready {
            device_id: id.to_string(),
        }],
        (Some(id), None) => vec![PlayerEvent::NotReady {
            device_id: id.to_string(),
        }],
        (Some(old), Some(new)) if old == new => vec![],
        (Some(old), Some(new)) => vec![
            PlayerEvent::NotReady {
                device_id: old.to_string(),
            },
            PlayerEvent::Ready {
                device_id: new.to_string(),
            },
        ],
    }
}

/// Maps a failed device listing to the event a player client would raise.
///
/// A body that does not parse as a device list is an initialization error.
/// Returns `None` for failures that are only logged.
pub fn listing_error_event(error: &DeviceListError) -> Option<PlayerEvent> {
    match error {
        DeviceListError::Status { status, message } if *status == StatusCode::UNAUTHORIZED => {
            Some(PlayerEvent::AuthenticationError {
                message: message.clone(),
            })
        }
        DeviceListError::Status { status, message } if *status == StatusCode::FORBIDDEN => {
            Some(PlayerEvent::AccountError {
                message: message.clone(),
            })
        }
        DeviceListError::Transport(e) if e.is_decode() => Some(PlayerEvent::InitializationError {
            message: e.to_string(),
        }),
        _ => None,
    }
}

fn ends_watch(event: &PlayerEvent) -> bool {
    matches!(
        event,
        PlayerEvent::AuthenticationError { .. } | PlayerEvent::AccountError { .. }
    )
}

/// Polls the device list and reports readiness of the selected device on `events`.
///
/// # Arguments
///
/// * `client` - Player client used for `GET /me/player/devices`
/// * `tokens` - Source of a valid access token for every poll
/// * `name` - Device name to wait for, or `None` to take the active device
/// * `events` - Receives `ready`, `not_ready` and error events
///
/// Stops after an authentication or account error, or when the receiver is
/// dropped. Initialization errors are reported and polled through, other
/// failures are only logged.
pub fn watch_device(
    client: Arc<SpotifyPlayerClient>,
    tokens: Arc<dyn TokenSource>,
    name: Option<String>,
    events: mpsc::Sender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current: Option<String> = None;
        let mut interval = tokio::time::interval(POLL_INTERVAL);

        loop {
            interval.tick().await;

            let token = match tokens.access_token().await {
                Ok(token) => token,
                Err(e) if e.requires_reauthorization() => {
                    let _ = events
                        .send(PlayerEvent::AuthenticationError {
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    tracing::warn!("No access token for device polling, retrying: {}", e);
                    continue;
                }
            };

            let found = match client.devices(&token).await {
                Ok(devices) => pick_device(&devices, name.as_deref()).and_then(|d| d.id.clone()),
                Err(e) => {
                    tracing::warn!("Device listing failed: {}", e);
                    if let Some(event) = listing_error_event(&e) {
                        let last = ends_watch(&event);
                        if events.send(event).await.is_err() || last {
                            return;
                        }
                    }
                    continue;
                }
            };

            for event in transition(current.as_deref(), found.as_deref()) {
                if events.send(event).await.is_err() {
                    return;
                }
            }
            current = found;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: Option<&str>, name: &str, active: bool) -> ConnectDevice {
        ConnectDevice {
            id: id.map(str::to_string),
            name: name.to_string(),
            kind: "Speaker".to_string(),
            is_active: active,
            is_restricted: false,
            volume_percent: Some(50),
        }
    }

    #[test]
    fn picks_named_device_case_insensitively() {
        let devices = vec![
            device(Some("a"), "Kitchen", true),
            device(Some("b"), "Living Room", false),
        ];
        assert_eq!(
            pick_device(&devices, Some("living room")).and_then(|d| d.id.as_deref()),
            Some("b")
        );
        assert!(pick_device(&devices, Some("Garage")).is_none());
    }

    #[test]
    fn prefers_active_then_first_addressable() {
        let devices = vec![
            device(None, "Web Player", true),
            device(Some("b"), "Phone", false),
            device(Some("c"), "Laptop", true),
        ];
        assert_eq!(
            pick_device(&devices, None).and_then(|d| d.id.as_deref()),
            Some("c")
        );

        let idle = vec![device(None, "Ghost", false), device(Some("d"), "Tv", false)];
        assert_eq!(pick_device(&idle, None).and_then(|d| d.id.as_deref()), Some("d"));
    }

    #[test]
    fn restricted_devices_are_skipped() {
        let mut tv = device(Some("tv"), "TV", true);
        tv.is_restricted = true;
        assert!(pick_device(&[tv], None).is_none());
    }

    #[test]
    fn transitions_between_devices() {
        assert!(transition(None, None).is_empty());
        assert!(transition(Some("a"), Some("a")).is_empty());
        assert_eq!(
            transition(None, Some("a")),
            vec![PlayerEvent::Ready {
                device_id: "a".into()
            }]
        );
        assert_eq!(
            transition(Some("a"), Some("b")),
            vec![
                PlayerEvent::NotReady {
                    device_id: "a".into()
                },
                PlayerEvent::Ready {
                    device_id: "b".into()
                },
            ]
        );
    }

    #[test]
    fn auth_and_account_failures_map_to_client_errors() {
        let unauthorized = DeviceListError::Status {
            status: StatusCode::UNAUTHORIZED,
            message: "expired".into(),
        };
        let forbidden = DeviceListError::Status {
            status: StatusCode::FORBIDDEN,
            message: "premium".into(),
        };
        let flaky = DeviceListError::Status {
            status: StatusCode::BAD_GATEWAY,
            message: String::new(),
        };

        assert!(matches!(
            listing_error_event(&unauthorized),
            Some(PlayerEvent::AuthenticationError { .. })
        ));
        assert!(matches!(
            listing_error_event(&forbidden),
            Some(PlayerEvent::AccountError { .. })
        ));
        assert!(listing_error_event(&flaky).is_none());
    }
}
