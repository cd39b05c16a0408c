use std::{sync::Arc, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::{sync::broadcast::error::RecvError, sync::mpsc, time::Instant};

use crate::{
    cli::{exit_with_auth_error, load_session},
    error::PlaybackError,
    error, info,
    management::{Session, check_range},
    spotify::{devices, player::SpotifyPlayerClient},
    success,
    types::{PlaybackEvent, PlayerEvent, Segment},
    utils::format_duration,
    warning,
};

const DEVICE_EVENT_BUFFER: usize = 16;
const PROGRESS_TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub track_uri: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub track_duration_ms: Option<u64>,
    pub device: Option<String>,
    pub looped: bool,
}

impl PlayOptions {
    fn segment(&self) -> Segment {
        let segment = Segment::new(self.track_uri.clone(), self.start_ms, self.end_ms);
        match self.track_duration_ms {
            Some(duration) => segment.with_track_duration(duration),
            None => segment,
        }
    }
}

struct Progress {
    bar: ProgressBar,
    started: Instant,
    total_ms: u64,
}

impl Progress {
    fn new(segment: &Segment) -> Self {
        let total_ms = segment.duration_ms();
        let bar = ProgressBar::new(total_ms);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg} [{bar:30.blue/white}] {prefix}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("=> "),
        );
        bar.set_message(format!(
            "{} {}-{}",
            segment.track_uri,
            format_duration(segment.start_ms),
            format_duration(segment.end_ms)
        ));
        let progress = Self {
            bar,
            started: Instant::now(),
            total_ms,
        };
        progress.update();
        progress
    }

    fn update(&self) {
        let elapsed = (self.started.elapsed().as_millis() as u64).min(self.total_ms);
        self.bar.set_position(elapsed);
        self.bar.set_prefix(format!(
            "{} / {}",
            format_duration(elapsed),
            format_duration(self.total_ms)
        ));
    }
}

async fn start(session: &Session, segment: &Segment) -> Progress {
    match session.play_segment(segment).await {
        Ok(()) => Progress::new(segment),
        Err(PlaybackError::Auth(e)) => exit_with_auth_error(e),
        Err(e) => error!("Playback failed: {}", e),
    }
}

/// Plays a segment once the device is ready and waits for it to end.
///
/// With `looped`, the segment starts over every time its stop fires. Ctrl-C
/// pauses playback immediately.
pub async fn play(opts: PlayOptions) {
    let segment = opts.segment();
    if let Err(e) = check_range(&segment) {
        error!("{}", e);
    }

    let session = load_session().await;
    let (tx, mut device_events) = mpsc::channel(DEVICE_EVENT_BUFFER);
    let watcher = devices::watch_device(
        Arc::new(SpotifyPlayerClient::from_env()),
        session.tokens().clone(),
        opts.device.clone(),
        tx,
    );

    let mut playback = session.scheduler().subscribe();
    let mut ticker = tokio::time::interval(PROGRESS_TICK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut progress: Option<Progress> = None;

    match &opts.device {
        Some(name) => info!("Waiting for device '{}'...", name),
        None => info!("Waiting for a device..."),
    }

    loop {
        tokio::select! {
            event = device_events.recv() => {
                let Some(event) = event else {
                    error!("Device watcher stopped unexpectedly.")
                };
                let was_ready = session.devices().current_device().is_some();
                if let Err(e) = session.handle_player_event(event).await {
                    if let Some(p) = progress.take() {
                        p.bar.abandon();
                    }
                    exit_with_auth_error(e);
                }

                match (was_ready, session.devices().current_device()) {
                    (false, Some(device)) => {
                        info!("Playing on device {}", device.device_id);
                        progress = Some(start(&session, &segment).await);
                    }
                    (true, None) => {
                        if let Some(p) = progress.take() {
                            p.bar.abandon();
                        }
                        warning!("Device went offline, waiting for it to come back...");
                    }
                    _ => {}
                }
            }
            event = playback.recv() => match event {
                Ok(PlaybackEvent::SegmentEnded { .. }) => {
                    if let Some(p) = progress.take() {
                        p.update();
                        p.bar.finish();
                    }
                    if !opts.looped {
                        success!("Segment finished.");
                        break;
                    }
                    progress = Some(start(&session, &segment).await);
                }
                Ok(PlaybackEvent::StopFailed { error, .. }) => {
                    if let Some(p) = progress.take() {
                        p.bar.abandon();
                    }
                    warning!("Could not pause at the end of the segment: {}", error);
                    break;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if let Some(p) = &progress {
                    p.update();
                }
            }
            _ = &mut ctrl_c => {
                if let Some(p) = progress.take() {
                    p.bar.abandon();
                }
                match session.stop_segment().await {
                    Ok(()) | Err(PlaybackError::DeviceNotReady) => success!("Stopped."),
                    Err(e) => warning!("Failed to pause: {}", e),
                }
                break;
            }
        }
    }

    watcher.abort();
}

/// Pauses playback on the named device, or on the active one.
pub async fn stop(device: Option<String>) {
    let session = load_session().await;
    let token = match session.tokens().get_valid_access_token().await {
        Ok(token) => token,
        Err(e) => exit_with_auth_error(e),
    };

    let available = match SpotifyPlayerClient::from_env().devices(&token).await {
        Ok(available) => available,
        Err(e) => error!("Failed to list devices: {}", e),
    };
    let Some(device_id) =
        devices::pick_device(&available, device.as_deref()).and_then(|d| d.id.clone())
    else {
        error!("No matching device found.")
    };

    if let Err(e) = session
        .handle_player_event(PlayerEvent::Ready { device_id })
        .await
    {
        exit_with_auth_error(e);
    }

    match session.stop_segment().await {
        Ok(()) => success!("Paused."),
        Err(PlaybackError::Auth(e)) => exit_with_auth_error(e),
        Err(e) => error!("Failed to pause: {}", e),
    }
}
