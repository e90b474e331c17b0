use fleetlink_store::{SharedStore, StoreLocation};
use fleetlink_sync::backend::mock::MockBackend;
use fleetlink_sync::notice::mock::RecordingNotifier;
use fleetlink_sync::{
    ConnectivityMonitor, NoticeLevel, SweepOutcome, SyncConfig, SyncCoordinator, SyncError,
};
use fleetlink_types::{CachedEntity, MutationRequest, SyncStatus};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: SharedStore,
    backend: Arc<MockBackend>,
    notifier: Arc<RecordingNotifier>,
    coordinator: Arc<SyncCoordinator>,
}

fn harness_with(store: SharedStore, config: SyncConfig) -> Harness {
    let backend = MockBackend::new();
    let notifier = RecordingNotifier::new();
    let coordinator = Arc::new(SyncCoordinator::new(
        config,
        store.clone(),
        backend.clone(),
        notifier.clone(),
    ));
    Harness {
        store,
        backend,
        notifier,
        coordinator,
    }
}

fn harness() -> Harness {
    harness_with(SharedStore::in_memory(), SyncConfig::default())
}

fn calls(backend: &MockBackend) -> Vec<(String, String)> {
    backend
        .executed()
        .into_iter()
        .map(|r| (r.method, r.url))
        .collect()
}

// ── Sweeps ──────────────────────────────────────────────────────

#[tokio::test]
async fn replays_in_enqueue_order_then_clears() {
    let h = harness();
    h.store
        .enqueue(MutationRequest::patch("/work-orders/1", json!({"status": "done"})))
        .await
        .unwrap();
    h.store
        .enqueue(MutationRequest::post("/work-orders", json!({"title": "New"})))
        .await
        .unwrap();

    let outcome = h.coordinator.on_connectivity_restored().await;

    assert_eq!(
        calls(&h.backend),
        vec![
            ("PATCH".to_string(), "/work-orders/1".to_string()),
            ("POST".to_string(), "/work-orders".to_string()),
        ]
    );
    assert_eq!(h.backend.executed()[0].body, json!({"status": "done"}));
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
    match outcome {
        SweepOutcome::Completed(report) => {
            assert_eq!(report.attempted, 2);
            assert_eq!(report.succeeded, 2);
            assert!(report.is_clean());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn empty_queue_is_silent() {
    let h = harness();

    let outcome = h.coordinator.on_connectivity_restored().await;

    assert_eq!(outcome, SweepOutcome::Idle);
    assert!(h.backend.executed().is_empty());
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn announces_start_and_end() {
    let h = harness();
    for i in 0..3 {
        h.store
            .enqueue(MutationRequest::post("/parts", json!({"n": i})))
            .await
            .unwrap();
    }

    h.coordinator.on_connectivity_restored().await;

    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert!(notices[0].message.contains('3'));
    assert_eq!(notices[1].level, NoticeLevel::Success);
}

#[tokio::test]
async fn failed_item_does_not_stop_sweep() {
    let h = harness();
    for url in ["/a", "/b", "/c"] {
        h.store
            .enqueue(MutationRequest::post(url, json!({})))
            .await
            .unwrap();
    }
    h.backend.script_execute([
        None,
        Some(SyncError::Http {
            status: 422,
            body: "invalid".into(),
        }),
        None,
    ]);

    let outcome = h.coordinator.on_connectivity_restored().await;

    assert_eq!(h.backend.executed().len(), 3);
    // The whole queue is cleared, failed item included.
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
    let SweepOutcome::Completed(report) = outcome else {
        panic!("expected a completed sweep");
    };
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].url, "/b");
    assert!(report.failed[0].error.contains("422"));
    assert_eq!(h.notifier.notices().last().unwrap().level, NoticeLevel::Success);
}

#[tokio::test(start_paused = true)]
async fn hung_replay_times_out_and_sweep_continues() {
    let h = harness_with(
        SharedStore::in_memory(),
        SyncConfig {
            replay_timeout_ms: 5_000,
        },
    );
    h.store
        .enqueue(MutationRequest::post("/slow", json!({})))
        .await
        .unwrap();
    h.backend.hang_execute(true);

    let outcome = h.coordinator.on_connectivity_restored().await;

    let SweepOutcome::Completed(report) = outcome else {
        panic!("expected a completed sweep");
    };
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("timed out"));
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn unreadable_queue_fails_without_replaying() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the database file should be makes open fail.
    let bad = dir.path().join("store.db");
    std::fs::create_dir_all(&bad).unwrap();
    let h = harness_with(
        SharedStore::new(StoreLocation::Path(bad)),
        SyncConfig::default(),
    );

    let outcome = h.coordinator.on_connectivity_restored().await;

    assert!(matches!(outcome, SweepOutcome::Failed(_)));
    assert!(h.backend.executed().is_empty());
    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert!(!h.coordinator.is_draining());
}

#[tokio::test]
async fn second_trigger_while_draining_is_rejected() {
    let h = harness_with(
        SharedStore::in_memory(),
        SyncConfig {
            replay_timeout_ms: 60_000,
        },
    );
    h.store
        .enqueue(MutationRequest::post("/slow", json!({})))
        .await
        .unwrap();
    h.backend.hang_execute(true);

    let first = tokio::spawn({
        let coordinator = h.coordinator.clone();
        async move { coordinator.on_connectivity_restored().await }
    });
    while !h.coordinator.is_draining() {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        h.coordinator.on_connectivity_restored().await,
        SweepOutcome::AlreadyDraining
    );
    first.abort();
    let _ = first.await;
    assert!(!h.coordinator.is_draining());
}

#[tokio::test]
async fn tagged_entities_move_out_of_pending() {
    let h = harness();
    let ok = h
        .store
        .put_pending(CachedEntity::new("wo-1", "Brake check", "open", "high"))
        .await
        .unwrap();
    let bad = h
        .store
        .put_pending(CachedEntity::new("wo-2", "Tyres", "open", "low"))
        .await
        .unwrap();
    h.store
        .enqueue(MutationRequest::patch("/work-orders/wo-1", json!({})).for_entity(&ok.id))
        .await
        .unwrap();
    h.store
        .enqueue(MutationRequest::patch("/work-orders/wo-2", json!({})).for_entity(&bad.id))
        .await
        .unwrap();
    h.backend.script_execute([
        None,
        Some(SyncError::Http {
            status: 500,
            body: String::new(),
        }),
    ]);

    h.coordinator.on_connectivity_restored().await;

    assert_eq!(
        h.store.get("wo-1").await.unwrap().unwrap().sync_status,
        SyncStatus::Synced
    );
    assert_eq!(
        h.store.get("wo-2").await.unwrap().unwrap().sync_status,
        SyncStatus::Error
    );
}

// ── Signal loop ─────────────────────────────────────────────────

#[tokio::test]
async fn run_sweeps_on_online_signal_only() {
    let h = harness();
    let monitor = ConnectivityMonitor::new(true);
    let task = tokio::spawn(h.coordinator.clone().run(monitor.subscribe()));

    h.store
        .enqueue(MutationRequest::post("/work-orders", json!({"title": "Offline"})))
        .await
        .unwrap();
    monitor.set_online(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.backend.executed().is_empty());

    monitor.set_online(true);
    for _ in 0..100 {
        if h.store.queue_len().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.backend.executed().len(), 1);
    assert_eq!(h.store.queue_len().await.unwrap(), 0);
    task.abort();
}

// ── Ordering property ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn replay_preserves_enqueue_order(urls in proptest::collection::vec("/[a-z]{1,8}/[0-9]{1,3}", 1..20)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let replayed = rt.block_on(async {
            let h = harness();
            for url in &urls {
                h.store
                    .enqueue(MutationRequest::put(url.clone(), json!({"url": url})))
                    .await
                    .unwrap();
            }
            h.coordinator.on_connectivity_restored().await;
            h.backend
                .executed()
                .into_iter()
                .map(|r| r.url)
                .collect::<Vec<_>>()
        });
        prop_assert_eq!(replayed, urls);
    }
}
