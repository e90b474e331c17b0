//! Replays the durable mutation queue when connectivity returns.
//!
//! A sweep reads the whole queue, replays each item one at a time in
//! insertion order, and then clears the queue. A failing item is logged and
//! reported but does not stop the sweep, and it is cleared along with the
//! rest. Only a sweep that cannot read the queue leaves it untouched.
//!
//! The sweep is triggered by [`ConnectivitySignal::Online`], not by the
//! realtime channel reopening.

use crate::backend::BackendApi;
use crate::connectivity::ConnectivitySignal;
use crate::error::SyncError;
use crate::notice::{Notice, Notifier};
use fleetlink_store::SharedStore;
use fleetlink_types::{QueuedMutation, SyncStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Sync coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for replaying a single queued mutation (ms).
    pub replay_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            replay_timeout_ms: 30_000,
        }
    }
}

/// A queued mutation whose replay failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMutation {
    pub sequence_id: i64,
    pub method: String,
    pub url: String,
    pub error: String,
}

/// Per-item outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedMutation>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of one connectivity-restored trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The queue was empty; nothing was replayed or announced.
    Idle,
    /// Every item was attempted and the queue was cleared.
    Completed(SweepReport),
    /// The sweep could not run; the queue was left as it was.
    Failed(String),
    /// Another sweep is already draining.
    AlreadyDraining,
}

/// Drains the mutation queue against the backend.
pub struct SyncCoordinator {
    config: SyncConfig,
    store: SharedStore,
    backend: Arc<dyn BackendApi>,
    notifier: Arc<dyn Notifier>,
    draining: AtomicBool,
}

/// Clears the draining flag however the sweep ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        store: SharedStore,
        backend: Arc<dyn BackendApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            notifier,
            draining: AtomicBool::new(false),
        }
    }

    /// Whether a sweep is in progress.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Runs one sweep. A trigger that arrives while a sweep is draining
    /// returns [`SweepOutcome::AlreadyDraining`] without touching the queue.
    pub async fn on_connectivity_restored(&self) -> SweepOutcome {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync sweep already in progress; ignoring trigger");
            return SweepOutcome::AlreadyDraining;
        }
        let _guard = DrainGuard(&self.draining);

        let queue = match self.store.drain_all().await {
            Ok(queue) => queue,
            Err(e) => {
                error!("Failed to read mutation queue: {}", e);
                self.notifier
                    .notify(Notice::error("Failed to sync offline changes"));
                return SweepOutcome::Failed(e.to_string());
            }
        };

        if queue.is_empty() {
            return SweepOutcome::Idle;
        }

        info!("Sync sweep started: {} queued mutations", queue.len());
        self.notifier.notify(Notice::info(format!(
            "Syncing {} offline {}...",
            queue.len(),
            plural(queue.len())
        )));

        let mut report = SweepReport::default();
        for mutation in &queue {
            report.attempted += 1;
            match self.replay_one(mutation).await {
                Ok(()) => {
                    report.succeeded += 1;
                    self.mark_entity(mutation, SyncStatus::Synced).await;
                }
                Err(e) => {
                    warn!("Replay of {} failed: {}", mutation.label(), e);
                    self.mark_entity(mutation, SyncStatus::Error).await;
                    report.failed.push(FailedMutation {
                        sequence_id: mutation.sequence_id,
                        method: mutation.method.clone(),
                        url: mutation.url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.store.clear().await {
            error!("Failed to clear mutation queue after sweep: {}", e);
            self.notifier
                .notify(Notice::error("Failed to sync offline changes"));
            return SweepOutcome::Failed(e.to_string());
        }

        if report.is_clean() {
            info!("Sync sweep finished: {} replayed", report.succeeded);
        } else {
            warn!(
                "Sync sweep finished: {} replayed, {} dropped after failing",
                report.succeeded,
                report.failed.len()
            );
        }
        self.notifier
            .notify(Notice::success("Offline changes synced"));

        SweepOutcome::Completed(report)
    }

    /// Sweeps on every `Online` signal until the sender goes away.
    pub async fn run(self: Arc<Self>, mut signals: broadcast::Receiver<ConnectivitySignal>) {
        loop {
            match signals.recv().await {
                Ok(ConnectivitySignal::Online) => {
                    let outcome = self.on_connectivity_restored().await;
                    debug!("Sweep outcome: {:?}", outcome);
                }
                Ok(ConnectivitySignal::Offline) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Missed {} connectivity signals", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn replay_one(&self, mutation: &QueuedMutation) -> Result<(), SyncError> {
        let deadline = Duration::from_millis(self.config.replay_timeout_ms);
        tokio::time::timeout(deadline, self.backend.replay(mutation))
            .await
            .unwrap_or(Err(SyncError::Timeout))
    }

    async fn mark_entity(&self, mutation: &QueuedMutation, status: SyncStatus) {
        let Some(id) = mutation.entity_id.clone() else {
            return;
        };
        if let Err(e) = self.store.set_sync_status(id.clone(), status).await {
            warn!("Failed to mark entity {} as {}: {}", id, status, e);
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "change" } else { "changes" }
}
