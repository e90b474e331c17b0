use fleetlink_store::SharedStore;
use fleetlink_sync::backend::mock::MockBackend;
use fleetlink_sync::{ConnectivityMonitor, MutationGateway, SubmitOutcome, SyncError};
use fleetlink_types::{CachedEntity, MutationRequest, SyncStatus};
use serde_json::json;

fn work_order() -> CachedEntity {
    CachedEntity::new("wo-1", "Replace brake pads", "open", "high")
}

#[tokio::test]
async fn online_submit_goes_straight_to_backend() {
    let store = SharedStore::in_memory();
    let backend = MockBackend::new();
    let gateway = MutationGateway::new(store.clone(), backend.clone(), ConnectivityMonitor::new(true));

    let outcome = gateway
        .submit(
            MutationRequest::patch("/work-orders/wo-1", json!({"status": "done"})),
            Some(work_order()),
        )
        .await
        .unwrap();

    assert_eq!(outcome, SubmitOutcome::Sent);
    assert_eq!(backend.executed().len(), 1);
    assert_eq!(backend.executed()[0].entity_id.as_deref(), Some("wo-1"));
    assert_eq!(store.queue_len().await.unwrap(), 0);
    assert_eq!(
        store.get("wo-1").await.unwrap().unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn offline_submit_queues_and_marks_pending() {
    let store = SharedStore::in_memory();
    let backend = MockBackend::new();
    let gateway = MutationGateway::new(store.clone(), backend.clone(), ConnectivityMonitor::new(false));

    let outcome = gateway
        .submit(
            MutationRequest::patch("/work-orders/wo-1", json!({"status": "done"})),
            Some(work_order()),
        )
        .await
        .unwrap();

    let SubmitOutcome::Queued(queued) = outcome else {
        panic!("expected the mutation to be queued");
    };
    assert_eq!(queued.method, "PATCH");
    assert_eq!(queued.entity_id.as_deref(), Some("wo-1"));
    assert!(backend.executed().is_empty());
    assert_eq!(store.queue_len().await.unwrap(), 1);

    let cached = gateway.cached_entities().await.unwrap();
    assert_eq!(cached.len(), 1);
    assert!(cached[0].is_pending());
}

#[tokio::test]
async fn transient_failure_falls_back_to_queue() {
    let store = SharedStore::in_memory();
    let backend = MockBackend::new();
    backend.fail_next_execute(SyncError::Network("connection reset".into()));
    let gateway = MutationGateway::new(store.clone(), backend.clone(), ConnectivityMonitor::new(true));

    let outcome = gateway
        .submit(MutationRequest::post("/work-orders", json!({"title": "New"})), None)
        .await
        .unwrap();

    assert!(matches!(outcome, SubmitOutcome::Queued(_)));
    assert_eq!(store.queue_len().await.unwrap(), 1);
}

#[tokio::test]
async fn server_rejection_is_returned() {
    let store = SharedStore::in_memory();
    let backend = MockBackend::new();
    backend.fail_next_execute(SyncError::Http {
        status: 400,
        body: "title required".into(),
    });
    let gateway = MutationGateway::new(store.clone(), backend, ConnectivityMonitor::new(true));

    let err = gateway
        .submit(MutationRequest::post("/work-orders", json!({})), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Http { status: 400, .. }));
    assert_eq!(store.queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn explicit_entity_tag_is_kept() {
    let store = SharedStore::in_memory();
    let gateway = MutationGateway::new(store.clone(), MockBackend::new(), ConnectivityMonitor::new(false));

    let outcome = gateway
        .submit(
            MutationRequest::patch("/work-orders/wo-1", json!({})).for_entity("other"),
            Some(work_order()),
        )
        .await
        .unwrap();

    let SubmitOutcome::Queued(queued) = outcome else {
        panic!("expected the mutation to be queued");
    };
    assert_eq!(queued.entity_id.as_deref(), Some("other"));
}
