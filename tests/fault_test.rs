// Behaviour when the storage provider fails or stalls

mod common;

use common::{FaultyStorage, capture_logs, store_over, text_blob};
use gridstore_core::{AccessContext, Error, ScopeOwner, StoreConfig};
use gridstore_namespace::{CheckpointRequest, CreateNamespaceRequest, WriteRequest};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failed_data_write_leaves_metadata_unchanged() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let id = text_blob(&store, &owner, "one").await;

    storage.fail_puts("/_v2/");
    let err = store
        .write_namespace(&id, WriteRequest::blob(b"two".to_vec()), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    let record = store.get_metadata(&id, &ctx).await.unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), b"one");

    storage.heal();
    assert_eq!(
        store
            .write_namespace(&id, WriteRequest::blob(b"two".to_vec()), &ctx)
            .await
            .unwrap(),
        2
    );
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), b"two");
}

#[tokio::test]
async fn test_failed_metadata_publish_is_logged_and_write_succeeds() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let id = text_blob(&store, &owner, "one").await;

    let (logs, _guard) = capture_logs();
    storage.fail_puts("metadata/");
    let version = store
        .write_namespace(&id, WriteRequest::blob(b"two".to_vec()), &ctx)
        .await
        .unwrap();
    assert_eq!(version, 2);
    assert!(logs.contents().contains("metadata publish failed"));

    // Durable copy is written before the cache, so neither saw version 2
    assert_eq!(store.get_metadata(&id, &ctx).await.unwrap().version, 1);
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), b"one");

    storage.heal();
    let version = store
        .write_namespace(&id, WriteRequest::blob(b"three".to_vec()), &ctx)
        .await
        .unwrap();
    assert_eq!(version, 2);
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), b"three");
}

#[tokio::test]
async fn test_slow_storage_times_out_and_releases_lock() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let hurried = ctx.clone().with_timeout(Duration::from_millis(50));
    let id = text_blob(&store, &owner, "one").await;

    storage.slow_puts("/_v2/", Duration::from_millis(500));
    let err = store
        .write_namespace(&id, WriteRequest::blob(b"two".to_vec()), &hurried)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProviderTimeout { .. }));

    storage.slow_gets("/_v1/", Duration::from_millis(500));
    let err = store.read_namespace(&id, None, &hurried).await.unwrap_err();
    assert!(matches!(err, Error::ProviderTimeout { .. }));
    assert_eq!(store.get_metadata(&id, &ctx).await.unwrap().version, 1);

    // A lock left behind would make this short-deadline write time out too
    storage.heal();
    let version = store
        .write_namespace(
            &id,
            WriteRequest::blob(b"two".to_vec()),
            &ctx.clone().with_timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    assert_eq!(version, 2);
}

#[tokio::test]
async fn test_checkpoint_failing_mid_copy_leaves_no_checkpoint() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let ctx = AccessContext::user("alice");
    let id = store
        .create_namespace(CreateNamespaceRequest::workspace(ScopeOwner::user("alice")), &ctx)
        .await
        .unwrap();
    for (path, data) in [("a.txt", "A"), ("b.txt", "B"), ("c.txt", "C")] {
        store
            .write_namespace(&id, WriteRequest::file(path, data.as_bytes().to_vec()), &ctx)
            .await
            .unwrap();
    }

    storage.fail_copies_after("checkpoints/", 1);
    let err = store
        .checkpoint_namespace(&id, CheckpointRequest::new("partial"), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    assert!(store.list_checkpoints(&id, &ctx).await.unwrap().is_empty());
    let record = store.get_metadata(&id, &ctx).await.unwrap();
    assert_eq!(record.version, 4);
    assert_eq!(record.checkpoint_seq, 0);

    storage.heal();
    let checkpoint = store
        .checkpoint_namespace(&id, CheckpointRequest::new("whole"), &ctx)
        .await
        .unwrap();
    assert_eq!(checkpoint.seq, 1);

    // The copy that landed before the failure has no manifest
    let report = store.sweep().await.unwrap();
    assert_eq!(report.orphaned_checkpoint_objects, 1);
    assert_eq!(store.list_checkpoints(&id, &ctx).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_restore_failing_mid_copy_keeps_current_state() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let ctx = AccessContext::user("alice");
    let id = store
        .create_namespace(CreateNamespaceRequest::workspace(ScopeOwner::user("alice")), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("a.txt", b"A0".to_vec()), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("b.txt", b"B0".to_vec()), &ctx)
        .await
        .unwrap();
    let checkpoint = store
        .checkpoint_namespace(&id, CheckpointRequest::new("base"), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("a.txt", b"A1".to_vec()), &ctx)
        .await
        .unwrap();

    storage.fail_copies_after("/_v5/", 1);
    let err = store
        .restore_namespace(&id, &checkpoint.checkpoint_id, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));

    assert_eq!(store.get_metadata(&id, &ctx).await.unwrap().version, 4);
    assert_eq!(store.read_namespace(&id, Some("a.txt"), &ctx).await.unwrap(), b"A1");
    assert_eq!(store.read_namespace(&id, Some("b.txt"), &ctx).await.unwrap(), b"B0");

    storage.heal();
    let version = store
        .restore_namespace(&id, &checkpoint.checkpoint_id, &ctx)
        .await
        .unwrap();
    assert_eq!(version, 5);
    assert_eq!(store.read_namespace(&id, Some("a.txt"), &ctx).await.unwrap(), b"A0");
}

#[tokio::test]
async fn test_read_survives_write_and_sweep_of_its_version() {
    let storage = FaultyStorage::new();
    let store = store_over(Arc::new(storage.clone()), StoreConfig::test_defaults());
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let id = text_blob(&store, &owner, "v1").await;

    storage.slow_gets("/_v1/", Duration::from_millis(300));
    let reader = {
        let store = store.clone();
        let id = id.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { store.read_namespace(&id, None, &ctx).await })
    };
    // Let the reader resolve version 1 and start fetching
    tokio::time::sleep(Duration::from_millis(50)).await;

    store
        .write_namespace(&id, WriteRequest::blob(b"v2".to_vec()), &ctx)
        .await
        .unwrap();
    let report = store.sweep().await.unwrap();
    assert_eq!(report.superseded_objects, 1);

    // Version 1 is gone, so the reader falls through to the newer version
    assert_eq!(reader.await.unwrap().unwrap(), b"v2");
}

#[tokio::test]
async fn test_sweep_grace_keeps_in_flight_version_readable() {
    let storage = FaultyStorage::new();
    let config = StoreConfig {
        sweep_grace_ms: 60_000,
        ..StoreConfig::test_defaults()
    };
    let store = store_over(Arc::new(storage.clone()), config);
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let id = text_blob(&store, &owner, "v1").await;

    storage.slow_gets("/_v1/", Duration::from_millis(300));
    let reader = {
        let store = store.clone();
        let id = id.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { store.read_namespace(&id, None, &ctx).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    store
        .write_namespace(&id, WriteRequest::blob(b"v2".to_vec()), &ctx)
        .await
        .unwrap();
    let report = store.sweep().await.unwrap();
    assert_eq!(report.superseded_objects, 0);

    assert_eq!(reader.await.unwrap().unwrap(), b"v1");
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), b"v2");
}
