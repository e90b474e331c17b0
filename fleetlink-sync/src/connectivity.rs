//! Online/offline signals.
//!
//! The monitor only reports edges: setting the same state twice emits
//! nothing. A health probe can drive it from backend reachability, or the
//! host can call [`ConnectivityMonitor::set_online`] from its own signal.

use crate::backend::BackendApi;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    Online,
    Offline,
}

/// Tracks whether the backend is reachable and broadcasts transitions.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    online: Arc<AtomicBool>,
    tx: broadcast::Sender<ConnectivitySignal>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            online: Arc::new(AtomicBool::new(initially_online)),
            tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Records the current state. Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }
        let signal = if online {
            ConnectivitySignal::Online
        } else {
            ConnectivitySignal::Offline
        };
        info!("Connectivity changed: {:?}", signal);
        // No receivers is fine.
        let _ = self.tx.send(signal);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivitySignal> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish()
    }
}

/// Pings the backend every `interval` and feeds the result into `monitor`.
pub fn spawn_health_probe(
    monitor: ConnectivityMonitor,
    backend: Arc<dyn BackendApi>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = match backend.ping().await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Health probe failed: {}", e);
                    false
                }
            };
            monitor.set_online(reachable);
        }
    })
}
