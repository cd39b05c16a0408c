use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};

use crate::{
    error::PlaybackError,
    management::auth::TokenSource,
    spotify::player::PlayerApi,
    types::{DeviceHandle, PlaybackEvent, Segment},
};

const EVENT_CAPACITY: usize = 32;

/// Handle to the one pending stop timer.
struct ScheduledStop {
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct StopSlot {
    pending: Option<ScheduledStop>,
    generation: u64,
}

impl StopSlot {
    fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(stop) => {
                stop.task.abort();
                tracing::debug!("Cancelled scheduled stop #{}", stop.generation);
                true
            }
            None => false,
        }
    }
}

/// Checks a segment and the target device before anything is sent to the player.
pub fn validate<'a>(
    segment: &Segment,
    device: Option<&'a DeviceHandle>,
) -> Result<&'a DeviceHandle, PlaybackError> {
    let device = device
        .filter(|d| d.ready)
        .ok_or(PlaybackError::DeviceNotReady)?;
    check_range(segment)?;
    Ok(device)
}

/// The range half of [`validate`], usable before any device is known.
pub fn check_range(segment: &Segment) -> Result<(), PlaybackError> {
    if segment.start_ms >= segment.end_ms {
        return Err(PlaybackError::InvalidRange {
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
        });
    }

    if let Some(track_duration_ms) = segment.track_duration_ms {
        if segment.end_ms > track_duration_ms {
            return Err(PlaybackError::RangeExceedsTrack {
                end_ms: segment.end_ms,
                track_duration_ms,
            });
        }
    }

    Ok(())
}

/// Plays segments on the remote device and pauses them when their range ends.
///
/// At most one stop is pending at any time. Starting a segment cancels the
/// previous segment's stop before its own requests are sent, and a cancelled
/// stop never issues its pause, even when its timer has already elapsed.
///
/// With a [`TokenSource`] attached, the scheduled stop asks it for a token
/// when the timer fires. Without one it reuses the token playback started with.
pub struct SegmentScheduler {
    api: Arc<dyn PlayerApi>,
    tokens: Option<Arc<dyn TokenSource>>,
    slot: Arc<StdMutex<StopSlot>>,
    sequence: Arc<Mutex<()>>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl SegmentScheduler {
    pub fn new(api: Arc<dyn PlayerApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            tokens: None,
            slot: Arc::new(StdMutex::new(StopSlot::default())),
            sequence: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn has_pending_stop(&self) -> bool {
        self.lock_slot().pending.is_some()
    }

    /// Drops the pending stop without touching the remote player.
    pub fn cancel_pending(&self) -> bool {
        self.lock_slot().cancel()
    }

    /// Transfers playback to `device`, starts the segment, and schedules its stop.
    ///
    /// Validation errors are returned before any request is made. A failed
    /// transfer or play aborts the sequence and leaves no stop scheduled.
    /// Nothing is retried.
    ///
    /// # Arguments
    ///
    /// * `segment` - Track URI and the `[start_ms, end_ms)` range to play
    /// * `token` - Access token for the transfer and play requests
    /// * `device` - The current device handle, which must be ready
    ///
    /// # Events
    ///
    /// Sends [`PlaybackEvent::SegmentStarted`] once playback is running. The
    /// stop later sends either [`PlaybackEvent::SegmentEnded`] or
    /// [`PlaybackEvent::StopFailed`], unless another segment or
    /// [`stop_segment`](Self::stop_segment) cancels it first.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let scheduler = SegmentScheduler::new(Arc::new(SpotifyPlayerClient::from_env()));
    /// let segment = Segment::new("spotify:track:4uLU6hMCjMI75M1A2tKUQC", 30_000, 45_000);
    /// scheduler.play_segment(&segment, &token, Some(&device)).await?;
    /// ```
    pub async fn play_segment(
        &self,
        segment: &Segment,
        token: &str,
        device: Option<&DeviceHandle>,
    ) -> Result<(), PlaybackError> {
        let device = validate(segment, device)?;
        let _sequence = self.sequence.lock().await;

        self.lock_slot().cancel();

        self.api.transfer(token, &device.device_id).await?;
        self.api
            .play(token, &device.device_id, &segment.track_uri, segment.start_ms)
            .await?;

        self.schedule_stop(segment.clone(), token.to_string(), device.device_id.clone());
        tracing::info!(
            "Playing {} from {} ms to {} ms on {}",
            segment.track_uri,
            segment.start_ms,
            segment.end_ms,
            device.device_id
        );
        let _ = self.events.send(PlaybackEvent::SegmentStarted {
            segment: segment.clone(),
        });
        Ok(())
    }

    /// Cancels any pending stop and pauses right away. Safe to call repeatedly.
    pub async fn stop_segment(
        &self,
        token: &str,
        device: Option<&DeviceHandle>,
    ) -> Result<(), PlaybackError> {
        let _sequence = self.sequence.lock().await;
        self.lock_slot().cancel();

        let device = device
            .filter(|d| d.ready)
            .ok_or(PlaybackError::DeviceNotReady)?;
        self.api.pause(token, &device.device_id).await?;

        let _ = self.events.send(PlaybackEvent::Stopped);
        Ok(())
    }

    fn schedule_stop(&self, segment: Segment, token: String, device_id: String) {
        let mut slot = self.lock_slot();
        slot.generation += 1;
        let generation = slot.generation;
        let delay = Duration::from_millis(segment.duration_ms());

        let api = Arc::clone(&self.api);
        let tokens = self.tokens.clone();
        let stop_slot = Arc::clone(&self.slot);
        let sequence = Arc::clone(&self.sequence);
        let events = self.events.clone();

        // The slot lock is held until the handle is stored, so the task
        // cannot observe the slot before its own generation is recorded.
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _sequence = sequence.lock().await;
            {
                let mut slot = stop_slot.lock().unwrap_or_else(|e| e.into_inner());
                match slot.pending.as_ref() {
                    Some(stop) if stop.generation == generation => slot.pending = None,
                    _ => return,
                }
            }

            let token = match tokens {
                Some(tokens) => tokens.access_token().await.map_err(PlaybackError::from),
                None => Ok(token),
            };
            let paused = match token {
                Ok(token) => api.pause(&token, &device_id).await,
                Err(e) => Err(e),
            };

            match paused {
                Ok(()) => {
                    tracing::debug!("Segment {} reached its end", segment.track_uri);
                    let _ = events.send(PlaybackEvent::SegmentEnded { segment });
                }
                Err(e) => {
                    tracing::warn!("Scheduled stop failed: {}", e);
                    let _ = events.send(PlaybackEvent::StopFailed {
                        segment,
                        error: e.to_string(),
                    });
                }
            }
        });

        slot.pending = Some(ScheduledStop { generation, task });
        tracing::debug!("Scheduled stop #{} in {:?}", generation, delay);
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, StopSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SegmentScheduler {
    fn drop(&mut self) {
        self.lock_slot().cancel();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::time::{Instant, sleep};

    use super::*;
    use crate::error::AuthError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Transfer(String),
        Play(String, u64),
        Pause(String),
    }

    #[derive(Default)]
    struct FakePlayerApi {
        calls: StdMutex<Vec<(Call, Instant)>>,
        pause_tokens: StdMutex<Vec<String>>,
        transfer_status: Option<u16>,
        play_status: Option<u16>,
        pause_status: Option<u16>,
    }

    impl FakePlayerApi {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }

        fn pauses(&self) -> Vec<Instant> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| matches!(c, Call::Pause(_)))
                .map(|(_, at)| *at)
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push((call, Instant::now()));
        }
    }

    #[async_trait]
    impl PlayerApi for FakePlayerApi {
        async fn transfer(&self, _token: &str, device_id: &str) -> Result<(), PlaybackError> {
            self.record(Call::Transfer(device_id.to_string()));
            match self.transfer_status {
                Some(status) => Err(PlaybackError::TransferFailed(status)),
                None => Ok(()),
            }
        }

        async fn play(
            &self,
            _token: &str,
            _device_id: &str,
            track_uri: &str,
            position_ms: u64,
        ) -> Result<(), PlaybackError> {
            self.record(Call::Play(track_uri.to_string(), position_ms));
            match self.play_status {
                Some(status) => Err(PlaybackError::PlayFailed(status)),
                None => Ok(()),
            }
        }

        async fn pause(&self, token: &str, device_id: &str) -> Result<(), PlaybackError> {
            self.record(Call::Pause(device_id.to_string()));
            self.pause_tokens.lock().unwrap().push(token.to_string());
            match self.pause_status {
                Some(status) => Err(PlaybackError::PauseFailed(status)),
                None => Ok(()),
            }
        }
    }

    /// Hands out "rotated" once asked, or fails when the session is gone.
    struct RotatingTokens {
        signed_out: bool,
    }

    #[async_trait]
    impl TokenSource for RotatingTokens {
        async fn access_token(&self) -> Result<String, AuthError> {
            if self.signed_out {
                Err(AuthError::Unauthenticated)
            } else {
                Ok("rotated".to_string())
            }
        }
    }

    fn device() -> DeviceHandle {
        DeviceHandle {
            device_id: "dev-1".into(),
            ready: true,
        }
    }

    fn assert_elapsed(from: Instant, at: Instant, expected_ms: u64) {
        let elapsed = at.duration_since(from).as_millis() as u64;
        assert!(
            (expected_ms..=expected_ms + 1).contains(&elapsed),
            "expected ~{expected_ms} ms, got {elapsed} ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn segment_is_paused_once_after_its_duration() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());
        let start = Instant::now();

        scheduler
            .play_segment(&Segment::new("t1", 0, 5000), "tok", Some(&device()))
            .await
            .unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::Transfer("dev-1".into()), Call::Play("t1".into(), 0)]
        );
        assert!(scheduler.has_pending_stop());

        sleep(Duration::from_millis(4_990)).await;
        assert!(api.pauses().is_empty());

        sleep(Duration::from_millis(20_000)).await;
        let pauses = api.pauses();
        assert_eq!(pauses.len(), 1);
        assert_elapsed(start, pauses[0], 5000);
        assert!(!scheduler.has_pending_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn new_segment_preempts_pending_stop() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());
        let start = Instant::now();

        scheduler
            .play_segment(&Segment::new("seg1", 10_000, 15_000), "tok", Some(&device()))
            .await
            .unwrap();
        sleep(Duration::from_millis(1000)).await;
        scheduler
            .play_segment(&Segment::new("seg2", 30_000, 35_000), "tok", Some(&device()))
            .await
            .unwrap();

        sleep(Duration::from_millis(20_000)).await;

        let pauses = api.pauses();
        assert_eq!(pauses.len(), 1, "seg1's stop must never fire");
        assert_elapsed(start, pauses[0], 6000);
        assert_eq!(
            api.calls(),
            vec![
                Call::Transfer("dev-1".into()),
                Call::Play("seg1".into(), 10_000),
                Call::Transfer("dev-1".into()),
                Call::Play("seg2".into(), 30_000),
                Call::Pause("dev-1".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_but_cancelled_stop_never_pauses() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());

        scheduler
            .play_segment(&Segment::new("a", 0, 1000), "tok", Some(&device()))
            .await
            .unwrap();

        // Hold the sequence lock across the deadline so the timer task is
        // parked right before its generation check.
        let guard = scheduler.sequence.lock().await;
        sleep(Duration::from_millis(1500)).await;
        scheduler.lock_slot().cancel();
        drop(guard);

        sleep(Duration::from_millis(5000)).await;
        assert!(api.pauses().is_empty());
    }

    #[tokio::test]
    async fn invalid_range_makes_no_calls() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());

        for (start, end) in [(5000, 5000), (6000, 5000)] {
            let err = scheduler
                .play_segment(&Segment::new("t", start, end), "tok", Some(&device()))
                .await
                .unwrap_err();
            assert!(matches!(err, PlaybackError::InvalidRange { .. }));
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn range_past_track_end_is_rejected() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());
        let segment = Segment::new("t", 0, 200_001).with_track_duration(200_000);

        let err = scheduler
            .play_segment(&segment, "tok", Some(&device()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlaybackError::RangeExceedsTrack {
                end_ms: 200_001,
                track_duration_ms: 200_000
            }
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn device_must_be_present_and_ready() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());
        let segment = Segment::new("t", 0, 1000);
        let stale = DeviceHandle {
            ready: false,
            ..device()
        };

        assert!(matches!(
            scheduler.play_segment(&segment, "tok", None).await,
            Err(PlaybackError::DeviceNotReady)
        ));
        assert!(matches!(
            scheduler.play_segment(&segment, "tok", Some(&stale)).await,
            Err(PlaybackError::DeviceNotReady)
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transfer_aborts_before_play() {
        let api = Arc::new(FakePlayerApi {
            transfer_status: Some(404),
            ..Default::default()
        });
        let scheduler = SegmentScheduler::new(api.clone());

        let err = scheduler
            .play_segment(&Segment::new("t", 0, 1000), "tok", Some(&device()))
            .await
            .unwrap_err();

        assert!(matches!(err, PlaybackError::TransferFailed(404)));
        assert_eq!(api.calls(), vec![Call::Transfer("dev-1".into())]);
        assert!(!scheduler.has_pending_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_play_leaves_no_stop_scheduled() {
        let failing = Arc::new(FakePlayerApi {
            play_status: Some(403),
            ..Default::default()
        });
        let scheduler = SegmentScheduler::new(failing.clone());

        let err = scheduler
            .play_segment(&Segment::new("t", 0, 1000), "tok", Some(&device()))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::PlayFailed(403)));
        assert!(!scheduler.has_pending_stop());

        sleep(Duration::from_millis(5000)).await;
        assert!(failing.pauses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_segment_cancels_and_pauses_immediately() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone());
        let start = Instant::now();

        scheduler
            .play_segment(&Segment::new("t", 0, 5000), "tok", Some(&device()))
            .await
            .unwrap();
        sleep(Duration::from_millis(2000)).await;
        scheduler.stop_segment("tok", Some(&device())).await.unwrap();
        scheduler.stop_segment("tok", Some(&device())).await.unwrap();

        sleep(Duration::from_millis(10_000)).await;
        let pauses = api.pauses();
        assert_eq!(pauses.len(), 2);
        assert_elapsed(start, pauses[0], 2000);
        assert_elapsed(start, pauses[1], 2000);
        assert!(!scheduler.has_pending_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_stop_is_reported_and_not_retried() {
        let api = Arc::new(FakePlayerApi {
            pause_status: Some(502),
            ..Default::default()
        });
        let scheduler = SegmentScheduler::new(api.clone());
        let mut events = scheduler.subscribe();

        scheduler
            .play_segment(&Segment::new("t", 0, 1000), "tok", Some(&device()))
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::SegmentStarted { .. }
        ));
        match events.recv().await.unwrap() {
            PlaybackEvent::StopFailed { segment, error } => {
                assert_eq!(segment.track_uri, "t");
                assert!(error.contains("502"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(api.pauses().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn segment_end_is_broadcast() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api);
        let mut events = scheduler.subscribe();

        scheduler
            .play_segment(&Segment::new("t", 1000, 2500), "tok", Some(&device()))
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::SegmentStarted { .. }
        ));
        match events.recv().await.unwrap() {
            PlaybackEvent::SegmentEnded { segment } => assert_eq!(segment.duration_ms(), 1500),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_fetches_its_token_when_the_timer_fires() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone())
            .with_token_source(Arc::new(RotatingTokens { signed_out: false }));

        scheduler
            .play_segment(&Segment::new("t", 0, 3_600_000), "expiring", Some(&device()))
            .await
            .unwrap();
        sleep(Duration::from_secs(3_601)).await;

        assert_eq!(*api.pause_tokens.lock().unwrap(), vec!["rotated".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_a_token_is_reported_and_skips_the_pause() {
        let api = Arc::new(FakePlayerApi::default());
        let scheduler = SegmentScheduler::new(api.clone())
            .with_token_source(Arc::new(RotatingTokens { signed_out: true }));
        let mut events = scheduler.subscribe();

        scheduler
            .play_segment(&Segment::new("t", 0, 1000), "tok", Some(&device()))
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            PlaybackEvent::SegmentStarted { .. }
        ));
        match events.recv().await.unwrap() {
            PlaybackEvent::StopFailed { error, .. } => assert!(error.contains("not authenticated")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(api.pauses().is_empty());
        assert!(!scheduler.has_pending_stop());
    }
}
