//! Notification feed: realtime push merged with the paginated pull query.
//!
//! Pushed notifications go into a most-recent-first buffer. The pulled page
//! is refreshed in the background whenever a push marks it stale. The list
//! presented to the user is computed on read: buffer first, then the page,
//! deduplicated by id, first occurrence wins.

use crate::backend::BackendApi;
use crate::connection::{ConnectionManager, InboundMessage, Subscription};
use crate::error::SyncResult;
use fleetlink_types::{NotificationEvent, RealtimeMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which page of the pull query the feed shows, and how many pushed
/// notifications are kept in front of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub page: u32,
    pub page_size: u32,
    /// Oldest pushes beyond this are dropped from the realtime buffer.
    pub realtime_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            realtime_capacity: 50,
        }
    }
}

/// Concatenates `realtime` before `pulled` and drops every later entry
/// whose id was already seen.
pub fn merge_notifications(
    realtime: &[NotificationEvent],
    pulled: &[NotificationEvent],
) -> Vec<NotificationEvent> {
    let mut seen = HashSet::with_capacity(realtime.len() + pulled.len());
    realtime
        .iter()
        .chain(pulled)
        .filter(|n| seen.insert(n.id.as_str()))
        .cloned()
        .collect()
}

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    pub items: Vec<NotificationEvent>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct FeedState {
    realtime: Vec<NotificationEvent>,
    pulled: Vec<NotificationEvent>,
    is_loading: bool,
    error: Option<String>,
    stale: bool,
}

/// Merged notification view for one session.
pub struct NotificationFeed {
    config: FeedConfig,
    backend: Arc<dyn BackendApi>,
    state: Mutex<FeedState>,
    refetch: Arc<Notify>,
    subscription: Mutex<Option<Subscription>>,
}

impl NotificationFeed {
    pub fn new(config: FeedConfig, backend: Arc<dyn BackendApi>) -> Arc<Self> {
        Arc::new(Self {
            config,
            backend,
            state: Mutex::new(FeedState {
                stale: true,
                ..FeedState::default()
            }),
            refetch: Arc::new(Notify::new()),
            subscription: Mutex::new(None),
        })
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to the channel's messages. Replaces any earlier
    /// subscription; [`NotificationFeed::detach`] ends it.
    pub fn attach(self: &Arc<Self>, connection: &ConnectionManager) {
        let feed: Weak<Self> = Arc::downgrade(self);
        let subscription = connection.subscribe(move |message| {
            if let Some(feed) = feed.upgrade() {
                feed.handle_message(message);
            }
            Ok(())
        });
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);
    }

    pub fn detach(&self) {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Applies one pushed message. Unparseable payloads are logged and
    /// leave the feed untouched.
    pub fn handle_message(&self, message: &InboundMessage) {
        let parsed = match message.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring malformed realtime payload: {}", e);
                return;
            }
        };

        let kind = parsed.kind();
        match parsed {
            RealtimeMessage::NotificationNew { notification } => {
                debug!("Realtime notification {}", notification.id);
                let mut state = self.state();
                state.realtime.retain(|n| n.id != notification.id);
                state.realtime.insert(0, notification);
                state.realtime.truncate(self.config.realtime_capacity.max(1));
                state.stale = true;
                drop(state);
                self.refetch.notify_one();
            }
            RealtimeMessage::NotificationRead { .. }
            | RealtimeMessage::NotificationDeleted { .. } => {
                debug!("Realtime {}; refreshing notifications", kind);
                self.mark_stale();
            }
            RealtimeMessage::Unknown => {
                debug!("Discarding realtime message of unknown type");
            }
        }
    }

    /// Flags the pulled page for a background refetch.
    pub fn mark_stale(&self) {
        self.state().stale = true;
        self.refetch.notify_one();
    }

    pub fn is_stale(&self) -> bool {
        self.state().stale
    }

    /// Fetches the configured page. On failure the previous page and the
    /// realtime buffer are kept and the error is recorded.
    pub async fn refresh(&self) -> SyncResult<()> {
        {
            let mut state = self.state();
            state.is_loading = true;
            state.stale = false;
        }

        let result = self
            .backend
            .fetch_notifications(self.config.page, self.config.page_size)
            .await;

        let mut state = self.state();
        state.is_loading = false;
        match result {
            Ok(page) => {
                state.pulled = page.items;
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Notification fetch failed: {}", e);
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// The realtime buffer, most recent first.
    pub fn realtime(&self) -> Vec<NotificationEvent> {
        self.state().realtime.clone()
    }

    /// The merged, deduplicated list.
    pub fn merged(&self) -> Vec<NotificationEvent> {
        let state = self.state();
        merge_notifications(&state.realtime, &state.pulled)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state();
        FeedSnapshot {
            items: merge_notifications(&state.realtime, &state.pulled),
            is_loading: state.is_loading,
            error: state.error.clone(),
        }
    }

    /// Refetches whenever the feed goes stale. Ends once the feed is dropped.
    pub fn spawn_refetch_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let feed = Arc::downgrade(self);
        let refetch = self.refetch.clone();
        tokio::spawn(async move {
            loop {
                let Some(strong) = feed.upgrade() else {
                    return;
                };
                if strong.is_stale() {
                    // The error is already recorded on the feed.
                    let _ = strong.refresh().await;
                    continue;
                }
                drop(strong);
                refetch.notified().await;
            }
        })
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        // Wakes the refetch loop so it sees the feed is gone.
        self.refetch.notify_one();
    }
}

impl std::fmt::Debug for NotificationFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("NotificationFeed")
            .field("realtime", &state.realtime.len())
            .field("pulled", &state.pulled.len())
            .field("stale", &state.stale)
            .finish()
    }
}
