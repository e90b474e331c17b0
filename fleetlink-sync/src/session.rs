//! Per-session context object.
//!
//! Everything that must exist exactly once per authenticated session (the
//! local store handle, the realtime channel, the sync coordinator and the
//! notification feed) is built here once and handed out by reference.
//! Tests build a session around mocks through [`SessionBuilder`].

use crate::auth::{AuthProvider, SessionAuth};
use crate::backend::{BackendApi, BackendConfig, HttpBackend};
use crate::channel::{ChannelConnector, WsConnector};
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::connectivity::{spawn_health_probe, ConnectivityMonitor};
use crate::coordinator::{SyncConfig, SyncCoordinator};
use crate::error::{SyncError, SyncResult};
use crate::merger::{FeedConfig, NotificationFeed};
use crate::notice::{LogNotifier, Notifier};
use crate::offline::MutationGateway;
use fleetlink_store::{SharedStore, StoreLocation};
use fleetlink_types::SessionId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Configuration for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub feed: FeedConfig,
    pub store: StoreLocation,
}

impl SessionConfig {
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

/// Builds a [`Session`], substituting any collaborator.
pub struct SessionBuilder {
    config: SessionConfig,
    auth: Option<Arc<dyn AuthProvider>>,
    connector: Option<Arc<dyn ChannelConnector>>,
    backend: Option<Arc<dyn BackendApi>>,
    notifier: Option<Arc<dyn Notifier>>,
    store: Option<SharedStore>,
    monitor: Option<ConnectivityMonitor>,
}

impl SessionBuilder {
    pub fn auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn ChannelConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn BackendApi>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn monitor(mut self, monitor: ConnectivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> SyncResult<Session> {
        let config = self.config;
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(SessionAuth::anonymous()));
        let backend: Arc<dyn BackendApi> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(config.backend.clone(), auth.clone())?),
        };
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));
        let store = self
            .store
            .unwrap_or_else(|| SharedStore::new(config.store.clone()));
        let monitor = self.monitor.unwrap_or_default();

        let connection = ConnectionManager::new(config.connection.clone(), auth.clone(), connector);
        let coordinator = Arc::new(SyncCoordinator::new(
            config.sync.clone(),
            store.clone(),
            backend.clone(),
            notifier,
        ));
        let feed = NotificationFeed::new(config.feed.clone(), backend.clone());
        let gateway = MutationGateway::new(store.clone(), backend.clone(), monitor.clone());

        Ok(Session {
            id: SessionId::new(),
            config,
            auth,
            backend,
            store,
            monitor,
            connection,
            coordinator,
            feed,
            gateway,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// One authenticated session's resilience layer.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    auth: Arc<dyn AuthProvider>,
    backend: Arc<dyn BackendApi>,
    store: SharedStore,
    monitor: ConnectivityMonitor,
    connection: ConnectionManager,
    coordinator: Arc<SyncCoordinator>,
    feed: Arc<NotificationFeed>,
    gateway: MutationGateway,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            auth: None,
            connector: None,
            backend: None,
            notifier: None,
            store: None,
            monitor: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn feed(&self) -> &Arc<NotificationFeed> {
        &self.feed
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    /// Opens the realtime channel, attaches the feed and starts the
    /// background loops. Calling it again only re-runs `connect()`.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.is_empty() {
            info!("Starting session {}", self.id);
            self.feed.attach(&self.connection);
            tasks.push(self.feed.spawn_refetch_loop());
            tasks.push(tokio::spawn(
                self.coordinator.clone().run(self.monitor.subscribe()),
            ));
        }
        drop(tasks);
        self.connection.connect();
    }

    /// Polls backend reachability every `interval` until shutdown.
    pub fn start_health_probe(&self, interval: Duration) {
        let handle = spawn_health_probe(self.monitor.clone(), self.backend.clone(), interval);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Closes the channel, cancels any pending reconnect and stops the
    /// background loops.
    pub async fn shutdown(&self) {
        info!("Shutting down session {}", self.id);
        self.connection.disconnect().await;
        self.feed.detach();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Session task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("online", &self.monitor.is_online())
            .finish()
    }
}
