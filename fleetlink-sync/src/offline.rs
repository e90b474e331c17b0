//! Write path for mutations made while the backend may be unreachable.

use crate::backend::BackendApi;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncResult;
use fleetlink_store::SharedStore;
use fleetlink_types::{CachedEntity, MutationRequest, QueuedMutation};
use std::sync::Arc;
use tracing::{debug, info};

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Sent to the backend and accepted.
    Sent,
    /// Captured in the durable queue for the next sweep.
    Queued(QueuedMutation),
}

/// Sends mutations directly while online and queues them otherwise.
///
/// Any caller may enqueue; only the sync coordinator drains or clears.
#[derive(Clone)]
pub struct MutationGateway {
    store: SharedStore,
    backend: Arc<dyn BackendApi>,
    monitor: ConnectivityMonitor,
}

impl MutationGateway {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn BackendApi>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            backend,
            monitor,
        }
    }

    /// Submits a mutation, optionally with the locally edited entity.
    ///
    /// Online, the request goes straight to the backend; a transient failure
    /// (network, timeout) falls back to the queue, while a server rejection
    /// is returned to the caller. Offline, the entity is cached as
    /// `pending` and the request is queued.
    pub async fn submit(
        &self,
        request: MutationRequest,
        entity: Option<CachedEntity>,
    ) -> SyncResult<SubmitOutcome> {
        let request = match &entity {
            Some(entity) if request.entity_id.is_none() => request.for_entity(entity.id.clone()),
            _ => request,
        };

        if self.monitor.is_online() {
            match self.backend.execute(&request).await {
                Ok(()) => {
                    if let Some(mut entity) = entity {
                        entity.mark_synced();
                        self.store.put(entity).await?;
                    }
                    return Ok(SubmitOutcome::Sent);
                }
                Err(e) if e.is_transient() => {
                    info!(
                        "Backend unreachable ({}); queueing {} {}",
                        e, request.method, request.url
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(entity) = entity {
            self.store.put_pending(entity).await?;
        }
        let queued = self.store.enqueue(request).await?;
        debug!("Queued {}", queued.label());
        Ok(SubmitOutcome::Queued(queued))
    }

    /// Cached entities for offline views.
    pub async fn cached_entities(&self) -> SyncResult<Vec<CachedEntity>> {
        Ok(self.store.get_all().await?)
    }
}
