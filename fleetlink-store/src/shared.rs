//! Lazily-initialised, shared handle to the local store.

use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, StoreLocation};
use fleetlink_types::{CachedEntity, MutationRequest, QueuedMutation, SyncStatus};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

type InitFuture = Shared<BoxFuture<'static, Result<Arc<LocalStore>, Arc<StoreError>>>>;

/// Handle to the session's single local store.
///
/// Cloning is cheap; every clone talks to the same store. The store is
/// opened on first access, and callers that arrive while that is still in
/// flight await the same initialisation instead of racing their own schema
/// setup. If initialisation fails, every waiting caller gets the error and
/// the next call starts a fresh attempt.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    location: StoreLocation,
    init: Mutex<Option<InitFuture>>,
}

impl SharedStore {
    /// Creates a handle. Nothing is opened until the first operation.
    pub fn new(location: StoreLocation) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                location,
                init: Mutex::new(None),
            }),
        }
    }

    /// Creates a handle to a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(StoreLocation::InMemory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Whether the store has been opened successfully.
    pub fn is_initialized(&self) -> bool {
        let slot = self.inner.init.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .and_then(|fut| fut.peek())
            .is_some_and(|res| res.is_ok())
    }

    /// Returns the opened store, initialising it on first use.
    pub async fn handle(&self) -> StoreResult<Arc<LocalStore>> {
        let init = {
            let mut slot = self.inner.init.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(fut) => fut.clone(),
                None => {
                    let fut = open_store(self.inner.location.clone()).boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        match init.await {
            Ok(store) => Ok(store),
            Err(e) => {
                let mut slot = self.inner.init.lock().unwrap_or_else(PoisonError::into_inner);
                let failed = slot
                    .as_ref()
                    .and_then(|fut| fut.peek())
                    .is_some_and(|res| res.is_err());
                if failed {
                    *slot = None;
                }
                Err(StoreError::Initialization(e))
            }
        }
    }

    async fn with_store<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&LocalStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.handle().await?;
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }

    // ── Cached entities ──────────────────────────────────────────

    pub async fn put(&self, entity: CachedEntity) -> StoreResult<()> {
        self.with_store(move |store| store.put(&entity)).await
    }

    pub async fn put_pending(&self, entity: CachedEntity) -> StoreResult<CachedEntity> {
        self.with_store(move |store| store.put_pending(&entity)).await
    }

    pub async fn get(&self, id: impl Into<String>) -> StoreResult<Option<CachedEntity>> {
        let id = id.into();
        self.with_store(move |store| store.get(&id)).await
    }

    pub async fn get_all(&self) -> StoreResult<Vec<CachedEntity>> {
        self.with_store(|store| store.get_all()).await
    }

    pub async fn set_sync_status(
        &self,
        id: impl Into<String>,
        status: SyncStatus,
    ) -> StoreResult<bool> {
        let id = id.into();
        self.with_store(move |store| store.set_sync_status(&id, status))
            .await
    }

    // ── Mutation queue ───────────────────────────────────────────

    pub async fn enqueue(&self, request: MutationRequest) -> StoreResult<QueuedMutation> {
        self.with_store(move |store| store.enqueue(&request)).await
    }

    pub async fn drain_all(&self) -> StoreResult<Vec<QueuedMutation>> {
        self.with_store(|store| store.drain_all()).await
    }

    pub async fn queue_len(&self) -> StoreResult<usize> {
        self.with_store(|store| store.queue_len()).await
    }

    pub async fn clear(&self) -> StoreResult<usize> {
        self.with_store(|store| store.clear()).await
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore")
            .field("location", &self.inner.location)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

async fn open_store(location: StoreLocation) -> Result<Arc<LocalStore>, Arc<StoreError>> {
    let opened = tokio::task::spawn_blocking(move || LocalStore::open(&location))
        .await
        .map_err(|e| Arc::new(StoreError::TaskJoin(e.to_string())))?;

    match opened {
        Ok(store) => {
            info!("Local store initialized");
            Ok(Arc::new(store))
        }
        Err(e) => {
            warn!("Local store initialization failed: {}", e);
            Err(Arc::new(e))
        }
    }
}
