use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::AuthError,
    types::{DeviceHandle, PlayerEvent},
};

pub type HandlerId = u64;

type DeviceHandler = Arc<dyn Fn(&DeviceHandle) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&AuthError) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    ready: Vec<(HandlerId, DeviceHandler)>,
    offline: Vec<(HandlerId, DeviceHandler)>,
    errors: Vec<(HandlerId, ErrorHandler)>,
}

/// Observer over the readiness events of the one remote playback device.
///
/// The session never creates the playback client; it only tracks what the
/// client reports. Handlers registered here are invoked synchronously from
/// [`DeviceSession::handle_event`], outside of any internal lock.
#[derive(Default)]
pub struct DeviceSession {
    device: Mutex<Option<DeviceHandle>>,
    handlers: Mutex<Handlers>,
    next_id: AtomicU64,
}

impl DeviceSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handler_id(&self) -> HandlerId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn on_device_ready(&self, handler: impl Fn(&DeviceHandle) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_handler_id();
        self.handlers().ready.push((id, Arc::new(handler)));
        id
    }

    pub fn on_device_offline(&self, handler: impl Fn(&DeviceHandle) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_handler_id();
        self.handlers().offline.push((id, Arc::new(handler)));
        id
    }

    /// Called with [`AuthError::AuthRejected`] or [`AuthError::AccountIneligible`].
    pub fn on_session_error(&self, handler: impl Fn(&AuthError) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_handler_id();
        self.handlers().errors.push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler registered with any of the `on_*` methods.
    /// Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers();
        let before = handlers.ready.len() + handlers.offline.len() + handlers.errors.len();
        handlers.ready.retain(|(h, _)| *h != id);
        handlers.offline.retain(|(h, _)| *h != id);
        handlers.errors.retain(|(h, _)| *h != id);
        before != handlers.ready.len() + handlers.offline.len() + handlers.errors.len()
    }

    /// The device playback can be sent to, if one is currently ready.
    pub fn current_device(&self) -> Option<DeviceHandle> {
        self.last_device().filter(|d| d.ready)
    }

    /// The last device reported, ready or not.
    pub fn last_device(&self) -> Option<DeviceHandle> {
        self.device.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Applies one event from the playback client.
    ///
    /// Authentication and account problems are returned as errors after the
    /// session-error handlers have seen them, so they cannot be mistaken for
    /// an ordinary playback failure.
    pub fn handle_event(&self, event: PlayerEvent) -> Result<(), AuthError> {
        match event {
            PlayerEvent::Ready { device_id } => {
                let handle = {
                    let mut device = self.device.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(current) = device.as_ref() {
                        if current.ready && current.device_id == device_id {
                            return Ok(());
                        }
                    }
                    let handle = DeviceHandle {
                        device_id,
                        ready: true,
                    };
                    *device = Some(handle.clone());
                    handle
                };
                tracing::info!("Device {} ready", handle.device_id);
                let handlers = self.snapshot(|h| &h.ready);
                handlers.iter().for_each(|handler| handler(&handle));
                Ok(())
            }
            PlayerEvent::NotReady { device_id } => {
                let handle = {
                    let mut device = self.device.lock().unwrap_or_else(|e| e.into_inner());
                    match device.as_mut() {
                        Some(current) if current.device_id == device_id && current.ready => {
                            current.ready = false;
                            current.clone()
                        }
                        _ => {
                            tracing::debug!("Ignoring not_ready for non-current device {}", device_id);
                            return Ok(());
                        }
                    }
                };
                tracing::info!("Device {} went offline", handle.device_id);
                let handlers = self.snapshot(|h| &h.offline);
                handlers.iter().for_each(|handler| handler(&handle));
                Ok(())
            }
            PlayerEvent::AuthenticationError { message } => {
                self.raise(AuthError::AuthRejected(message))
            }
            PlayerEvent::AccountError { message } => {
                self.raise(AuthError::AccountIneligible(message))
            }
            PlayerEvent::InitializationError { message } => {
                tracing::warn!("Playback client failed to initialize: {}", message);
                Ok(())
            }
        }
    }

    /// Feeds the session from a channel of client events until the sender is dropped.
    pub fn attach(self: Arc<Self>, mut events: mpsc::Receiver<PlayerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(e) = self.handle_event(event) {
                    tracing::warn!("Player session error: {}", e);
                }
            }
            tracing::debug!("Player event source closed");
        })
    }

    fn raise(&self, error: AuthError) -> Result<(), AuthError> {
        tracing::warn!("{}", error);
        let handlers: Vec<ErrorHandler> = self
            .handlers()
            .errors
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        handlers.iter().for_each(|handler| handler(&error));
        Err(error)
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(
        &self,
        pick: impl Fn(&Handlers) -> &Vec<(HandlerId, DeviceHandler)>,
    ) -> Vec<DeviceHandler> {
        pick(&self.handlers())
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn ready(id: &str) -> PlayerEvent {
        PlayerEvent::Ready {
            device_id: id.to_string(),
        }
    }

    fn not_ready(id: &str) -> PlayerEvent {
        PlayerEvent::NotReady {
            device_id: id.to_string(),
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&DeviceHandle) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move |_: &DeviceHandle| {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn no_device_until_ready() {
        let session = DeviceSession::new();
        assert_eq!(session.current_device(), None);

        session.handle_event(ready("dev-1")).unwrap();
        assert_eq!(
            session.current_device(),
            Some(DeviceHandle {
                device_id: "dev-1".into(),
                ready: true
            })
        );
    }

    #[test]
    fn repeated_ready_is_a_noop() {
        let session = DeviceSession::new();
        let (count, handler) = counter();
        session.on_device_ready(handler);

        session.handle_event(ready("dev-1")).unwrap();
        session.handle_event(ready("dev-1")).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn not_ready_keeps_history_and_ready_again_is_accepted() {
        let session = DeviceSession::new();
        let (ready_count, on_ready) = counter();
        let (offline_count, on_offline) = counter();
        session.on_device_ready(on_ready);
        session.on_device_offline(on_offline);

        session.handle_event(ready("dev-1")).unwrap();
        session.handle_event(not_ready("dev-1")).unwrap();

        assert_eq!(session.current_device(), None);
        assert_eq!(
            session.last_device(),
            Some(DeviceHandle {
                device_id: "dev-1".into(),
                ready: false
            })
        );
        assert_eq!(offline_count.load(Ordering::SeqCst), 1);

        session.handle_event(ready("dev-1")).unwrap();
        assert!(session.current_device().is_some());
        assert_eq!(ready_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_ready_for_other_device_is_ignored() {
        let session = DeviceSession::new();
        session.handle_event(ready("dev-1")).unwrap();
        session.handle_event(not_ready("dev-2")).unwrap();

        assert_eq!(session.current_device().unwrap().device_id, "dev-1");
    }

    #[test]
    fn new_device_replaces_current() {
        let session = DeviceSession::new();
        session.handle_event(ready("dev-1")).unwrap();
        session.handle_event(ready("dev-2")).unwrap();

        assert_eq!(session.current_device().unwrap().device_id, "dev-2");
    }

    #[test]
    fn unsubscribed_handler_is_not_called() {
        let session = DeviceSession::new();
        let (count, handler) = counter();
        let id = session.on_device_ready(handler);

        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.handle_event(ready("dev-1")).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn client_errors_become_session_errors() {
        let session = DeviceSession::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_session_error(move |e| sink.lock().unwrap().push(e.to_string()));

        let auth = session.handle_event(PlayerEvent::AuthenticationError {
            message: "Invalid token scopes.".into(),
        });
        let account = session.handle_event(PlayerEvent::AccountError {
            message: "Premium required".into(),
        });

        assert!(matches!(auth, Err(AuthError::AuthRejected(m)) if m == "Invalid token scopes."));
        assert!(matches!(account, Err(AuthError::AccountIneligible(_))));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let session = Arc::new(DeviceSession::new());
        let slot = Arc::new(Mutex::new(None::<HandlerId>));
        let (weak, inner_slot) = (Arc::downgrade(&session), Arc::clone(&slot));
        let id = session.on_device_ready(move |_| {
            if let (Some(s), Some(id)) = (weak.upgrade(), *inner_slot.lock().unwrap()) {
                s.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        session.handle_event(ready("dev-1")).unwrap();
        assert!(!session.unsubscribe(id));
    }

    #[tokio::test]
    async fn attach_consumes_fake_event_source() {
        let session = Arc::new(DeviceSession::new());
        let (tx, rx) = mpsc::channel(8);
        let task = Arc::clone(&session).attach(rx);

        tx.send(ready("dev-9")).await.unwrap();
        tx.send(PlayerEvent::AccountError {
            message: "free".into(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(session.current_device().unwrap().device_id, "dev-9");
    }
}
