use fleetlink_store::{SharedStore, StoreError, StoreLocation};
use fleetlink_types::{CachedEntity, MutationRequest, SyncStatus};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn lazily_initialises_on_first_use() {
    let store = SharedStore::in_memory();
    assert!(!store.is_initialized());
    assert_eq!(store.queue_len().await.unwrap(), 0);
    assert!(store.is_initialized());
}

#[tokio::test]
async fn concurrent_callers_share_one_initialisation() {
    let store = SharedStore::in_memory();
    let (a, b, c) = tokio::join!(store.handle(), store.handle(), store.handle());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));
}

#[tokio::test]
async fn clones_share_the_same_store() {
    let store = SharedStore::in_memory();
    let other = store.clone();
    store
        .enqueue(MutationRequest::post("/work-orders", json!({"title": "New"})))
        .await
        .unwrap();
    assert_eq!(other.queue_len().await.unwrap(), 1);
}

#[tokio::test]
async fn initialisation_failure_reaches_every_waiter() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let store = SharedStore::new(StoreLocation::Path(blocker.join("store.sqlite")));

    let (a, b) = tokio::join!(store.handle(), store.handle());
    assert!(matches!(a, Err(StoreError::Initialization(_))));
    assert!(matches!(b, Err(StoreError::Initialization(_))));
    assert!(!store.is_initialized());

    // A later call retries from scratch.
    std::fs::remove_file(&blocker).unwrap();
    assert!(store.handle().await.is_ok());
}

#[tokio::test]
async fn async_operations_round_through_the_store() {
    let store = SharedStore::in_memory();
    let pending = store
        .put_pending(CachedEntity::new("wo-1", "Brakes", "open", "high"))
        .await
        .unwrap();
    assert_eq!(pending.sync_status, SyncStatus::Pending);

    assert!(store.set_sync_status("wo-1", SyncStatus::Synced).await.unwrap());
    assert_eq!(
        store.get("wo-1").await.unwrap().unwrap().sync_status,
        SyncStatus::Synced
    );

    store.enqueue(MutationRequest::delete("/work-orders/1")).await.unwrap();
    store.enqueue(MutationRequest::delete("/work-orders/2")).await.unwrap();
    let drained = store.drain_all().await.unwrap();
    assert_eq!(drained.len(), 2);
    assert_eq!(store.clear().await.unwrap(), 2);
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn enqueued_mutation_survives_simulated_restart() {
    let dir = tempfile::tempdir().unwrap();
    let location = StoreLocation::Path(dir.path().join("offline.sqlite"));

    let first = SharedStore::new(location.clone());
    first
        .enqueue(MutationRequest::patch("/work-orders/1", json!({"status": "done"})))
        .await
        .unwrap();
    drop(first);

    let second = SharedStore::new(location);
    let drained = second.drain_all().await.unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].method, "PATCH");
}
