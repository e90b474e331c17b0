//! Connection manager for the session's realtime channel.
//!
//! Owns exactly one channel per authenticated session:
//!
//! - Opens the channel on [`ConnectionManager::connect`] (idempotent)
//! - Publishes lifecycle state (`connecting`, `connected`, `disconnected`, `error`)
//! - Fans each inbound message out to subscribers in registration order
//! - Reconnects after a close with exponential backoff, up to a fixed number
//!   of attempts; after that only an explicit `connect()` tries again
//! - Sends outbound messages best-effort, only while the channel is open
//!
//! Liveness comes from the channel's own close and error signals. There is
//! no heartbeat and no outbound buffering.

use crate::auth::AuthProvider;
use crate::backoff::Backoff;
use crate::channel::{ChannelConnector, ChannelEvent, RealtimeChannel};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use fleetlink_types::{ConnectionState, RealtimeMessage};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base address of the dashboard backend (`http` or `https`).
    pub base_url: String,
    /// Path of the realtime endpoint under `base_url`.
    pub realtime_path: String,
    /// First reconnect delay (ms).
    pub base_delay_ms: u64,
    /// Reconnect delay ceiling (ms).
    pub max_delay_ms: u64,
    /// Automatic reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// Deadline for a single open attempt (ms).
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            realtime_path: "/ws".to_string(),
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    /// The realtime endpoint without credentials: `http` becomes `ws`,
    /// `https` becomes `wss`.
    pub fn endpoint(&self) -> SyncResult<Url> {
        let mut url = Url::parse(self.base_url.trim())
            .map_err(|e| SyncError::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(SyncError::Config(format!(
                    "unsupported base_url scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::Config(format!("cannot switch base_url to {scheme}")))?;
        url.set_path(&self.realtime_path);
        url.set_query(None);
        Ok(url)
    }

    /// The endpoint with the session token attached.
    pub fn authenticated_endpoint(&self, token: &str) -> SyncResult<Url> {
        let mut url = self.endpoint()?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// A raw message received over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub raw: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            received_at: Utc::now(),
        }
    }

    /// Decodes the payload into the known message set.
    pub fn parse(&self) -> fleetlink_types::Result<RealtimeMessage> {
        RealtimeMessage::parse(&self.raw)
    }
}

/// Error a subscriber may return; it is logged and does not affect others.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Callback = dyn Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync;

// ── Subscribers ──────────────────────────────────────────────────

/// Registered callbacks. The registry only holds weak references: a
/// subscriber lives exactly as long as its [`Subscription`].
#[derive(Default)]
struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Weak<Callback>)>>,
}

impl SubscriberRegistry {
    fn entries(&self) -> MutexGuard<'_, Vec<(u64, Weak<Callback>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, callback: &Arc<Callback>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries.push((id, Arc::downgrade(callback)));
        id
    }

    fn remove(&self, id: u64) {
        self.entries().retain(|(entry_id, _)| *entry_id != id);
    }

    fn len(&self) -> usize {
        self.entries()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Delivers one message to every live subscriber, in registration
    /// order, over a snapshot taken before the first call. Subscribers may
    /// subscribe or unsubscribe from inside their callback.
    fn fan_out(&self, message: &InboundMessage) {
        let snapshot: Vec<(u64, Weak<Callback>)> = self.entries().clone();
        for (id, weak) in snapshot {
            let Some(callback) = weak.upgrade() else {
                continue;
            };
            if let Err(e) = callback(message) {
                warn!("Realtime subscriber {} failed: {}", id, e);
            }
        }
    }
}

/// Keeps a subscriber registered. Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes the subscriber.
#[must_use = "the subscriber is removed when the Subscription is dropped"]
pub struct Subscription {
    id: u64,
    _callback: Arc<Callback>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ── ConnectionManager ────────────────────────────────────────────

/// Background task driving one channel lifecycle plus reconnects.
struct Worker {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

struct ManagerInner {
    config: ConnectionConfig,
    backoff: Backoff,
    auth: Arc<dyn AuthProvider>,
    connector: Arc<dyn ChannelConnector>,
    state_tx: watch::Sender<ConnectionState>,
    last_message: Mutex<Option<InboundMessage>>,
    subscribers: Arc<SubscriberRegistry>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    reconnect_attempts: AtomicU32,
    worker: Mutex<Option<Worker>>,
}

impl ManagerInner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Realtime channel {} -> {}", previous, state);
        }
    }

    fn outgoing(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outgoing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, raw: String) {
        let message = InboundMessage::new(raw);
        *self
            .last_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(message.clone());
        self.subscribers.fan_out(&message);
    }
}

/// Handle to the session's realtime channel. Cloning is cheap; all clones
/// share the same channel, state and subscribers.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        auth: Arc<dyn AuthProvider>,
        connector: Arc<dyn ChannelConnector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                backoff: config.backoff(),
                config,
                auth,
                connector,
                state_tx,
                last_message: Mutex::new(None),
                subscribers: Arc::new(SubscriberRegistry::default()),
                outgoing: Mutex::new(None),
                reconnect_attempts: AtomicU32::new(0),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The realtime endpoint, without the session token.
    pub fn endpoint(&self) -> SyncResult<Url> {
        self.inner.config.endpoint()
    }

    /// Current channel state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The most recent inbound message.
    pub fn last_message(&self) -> Option<InboundMessage> {
        self.inner
            .last_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consecutive failed opens since the channel was last open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Whether a channel or a pending reconnect is active.
    pub fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Opens the channel if it is not already open or reconnecting.
    ///
    /// Without an auth context this is a no-op that leaves the state
    /// `disconnected`. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        if !self.inner.auth.is_authenticated() {
            debug!("No auth context; realtime channel not opened");
            self.inner.set_state(ConnectionState::Disconnected);
            return;
        }

        let mut worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("Realtime channel already active");
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let handle = tokio::spawn(run_channel(inner, shutdown_rx));
        *worker = Some(Worker {
            handle,
            shutdown: Some(shutdown_tx),
        });
    }

    /// Closes the channel and cancels any pending reconnect.
    pub async fn disconnect(&self) {
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut worker) = worker {
            if let Some(tx) = worker.shutdown.take() {
                let _ = tx.send(());
            }
            if let Err(e) = worker.handle.await {
                warn!("Realtime channel task ended abnormally: {}", e);
            }
        }
        self.inner.outgoing().take();
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Serializes and sends `message` if the channel is open.
    ///
    /// Best-effort: returns `false` (and logs a warning) when the channel is
    /// not open. Nothing is buffered or retried.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        if !self.state().is_operational() {
            warn!("Realtime channel not open; dropping outbound message");
            return false;
        }
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize outbound message: {}", e);
                return false;
            }
        };
        match self.inner.outgoing().as_ref() {
            Some(tx) if tx.send(payload).is_ok() => true,
            _ => {
                warn!("Realtime channel closed while sending; message dropped");
                false
            }
        }
    }

    /// Registers a callback for every inbound message.
    ///
    /// The manager keeps only a weak reference; the subscriber stays
    /// registered for as long as the returned [`Subscription`] lives.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let callback: Arc<Callback> = Arc::new(callback);
        let id = self.inner.subscribers.register(&callback);
        Subscription {
            id,
            _callback: callback,
            registry: Arc::downgrade(&self.inner.subscribers),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ── Background channel task ──────────────────────────────────────

/// Opens the channel, pumps it until it closes, then schedules reconnects
/// until the attempt cap or shutdown.
async fn run_channel(inner: Arc<ManagerInner>, mut shutdown: oneshot::Receiver<()>) {
    let connect_timeout = Duration::from_millis(inner.config.connect_timeout_ms);

    loop {
        let Some(token) = inner.auth.token() else {
            info!("Auth context gone; realtime channel stays closed");
            inner.set_state(ConnectionState::Disconnected);
            return;
        };
        let url = match inner.config.authenticated_endpoint(&token) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot open realtime channel: {}", e);
                inner.set_state(ConnectionState::Error);
                return;
            }
        };

        inner.set_state(ConnectionState::Connecting);
        let opened = tokio::select! {
            _ = &mut shutdown => {
                inner.set_state(ConnectionState::Disconnected);
                return;
            }
            res = tokio::time::timeout(connect_timeout, inner.connector.open(&url)) => {
                res.unwrap_or(Err(SyncError::Timeout))
            }
        };

        match opened {
            Ok(channel) => {
                if pump_channel(&inner, channel, &mut shutdown).await {
                    inner.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
            Err(e) => {
                warn!("Realtime channel failed to open: {}", e);
                inner.set_state(ConnectionState::Error);
                inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            }
        }

        inner.set_state(ConnectionState::Disconnected);

        // Zero after a drop of an open channel, else consecutive failed opens.
        let failures = inner.reconnect_attempts.load(Ordering::SeqCst);
        let Some(delay) = inner.backoff.delay_for(failures) else {
            warn!(
                "Giving up on realtime channel after {} failed attempts",
                failures
            );
            return;
        };
        info!(
            "Reconnecting realtime channel in {}ms ({} consecutive failures)",
            delay.as_millis(),
            failures
        );

        tokio::select! {
            _ = &mut shutdown => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Runs one open channel. Returns `true` if shutdown was requested.
async fn pump_channel(
    inner: &ManagerInner,
    channel: RealtimeChannel,
    shutdown: &mut oneshot::Receiver<()>,
) -> bool {
    let RealtimeChannel {
        mut incoming,
        outgoing,
    } = channel;

    inner.reconnect_attempts.store(0, Ordering::SeqCst);
    *inner.outgoing() = Some(outgoing);
    inner.set_state(ConnectionState::Connected);
    info!("Realtime channel connected");

    let stopped = loop {
        tokio::select! {
            _ = &mut *shutdown => break true,
            event = incoming.recv() => match event {
                Some(ChannelEvent::Message(raw)) => {
                    // A frame after a transient error means the channel is still up.
                    if *inner.state_tx.borrow() == ConnectionState::Error {
                        inner.set_state(ConnectionState::Connected);
                    }
                    inner.dispatch(raw);
                }
                Some(ChannelEvent::Error(reason)) => {
                    warn!("Realtime channel error: {}", reason);
                    inner.set_state(ConnectionState::Error);
                }
                Some(ChannelEvent::Closed { code, reason }) => {
                    info!("Realtime channel closed (code {:?}): {}", code, reason);
                    break false;
                }
                None => {
                    info!("Realtime channel dropped");
                    break false;
                }
            },
        }
    };

    inner.outgoing().take();
    stopped
}
