// Integration tests for the namespace engine over in-memory back-ends

mod common;

use common::{memory_store, text_blob};
use gridstore_core::{AccessContext, Error, GridAddress, NamespaceId, ScopeOwner, grid};
use gridstore_namespace::{
    BatchItem, BatchOptions, CheckpointRequest, CreateNamespaceRequest, PresignUploadRequest,
    RegisterRequest, StoreRequest, WriteRequest,
};
use std::time::Duration;

#[test]
fn test_grid_paths_round_trip() {
    let owners = [
        ScopeOwner::session("sess/with%slash"),
        ScopeOwner::user("alice"),
        ScopeOwner::Sandbox,
    ];
    for owner in owners {
        let address = GridAddress::new("sbx", owner, NamespaceId::from("ns-1"))
            .with_subpath("src/lib.rs");
        let path = address.encode().unwrap();
        assert_eq!(grid::decode(&path).unwrap(), address);
    }
}

#[test]
fn test_legacy_grid_path_decodes_as_session() {
    let address = grid::decode("grid/sbx/sess1/artifact9").unwrap();
    assert_eq!(address.sandbox_id, "sbx");
    assert_eq!(address.owner, ScopeOwner::session("sess1"));
    assert_eq!(address.namespace_id, NamespaceId::from("artifact9"));
    assert_eq!(address.subpath, None);

    assert!(matches!(
        grid::decode("blob/sbx/sess1/artifact9"),
        Err(Error::MalformedPath { .. })
    ));
}

#[tokio::test]
async fn test_blob_round_trip() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);

    let payload: Vec<u8> = (0..=255u8).collect();
    let id = store
        .create_namespace(
            CreateNamespaceRequest::blob(owner.clone(), "application/octet-stream")
                .with_data(payload.clone()),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(store.read_namespace(&id, None, &ctx).await.unwrap(), payload);

    let record = store.get_metadata(&id, &ctx).await.unwrap();
    assert_eq!(record.bytes, 256);
    assert_eq!(record.version, 1);
    assert_eq!(record.checksum, gridstore_core::sha256_hex(&payload));
}

#[tokio::test]
async fn test_empty_blob() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::user("alice");
    let ctx = AccessContext::for_owner(&owner);

    let id = store
        .create_namespace(CreateNamespaceRequest::blob(owner, "text/plain"), &ctx)
        .await
        .unwrap();
    assert!(store.read_namespace(&id, None, &ctx).await.unwrap().is_empty());
    assert_eq!(store.get_metadata(&id, &ctx).await.unwrap().bytes, 0);
}

#[tokio::test]
async fn test_payload_ceiling() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::user("alice");
    let ctx = AccessContext::for_owner(&owner);
    let too_big = vec![0u8; store.config().max_payload_bytes as usize + 1];

    let err = store
        .create_namespace(
            CreateNamespaceRequest::blob(owner, "application/octet-stream").with_data(too_big),
            &ctx,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_checkpoint_restore_is_idempotent() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::user("alice");
    let ctx = AccessContext::for_owner(&owner);
    let id = store
        .create_namespace(CreateNamespaceRequest::workspace(owner), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("notes.md", b"draft".to_vec()), &ctx)
        .await
        .unwrap();

    let checkpoint = store
        .checkpoint_namespace(&id, CheckpointRequest::new("draft"), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("notes.md", b"final".to_vec()), &ctx)
        .await
        .unwrap();
    store
        .write_namespace(&id, WriteRequest::file("extra.md", b"new".to_vec()), &ctx)
        .await
        .unwrap();

    for _ in 0..2 {
        store
            .restore_namespace(&id, &checkpoint.checkpoint_id, &ctx)
            .await
            .unwrap();
        assert_eq!(
            store.read_namespace(&id, Some("notes.md"), &ctx).await.unwrap(),
            b"draft"
        );
        assert!(
            store
                .read_namespace(&id, Some("extra.md"), &ctx)
                .await
                .unwrap_err()
                .is_not_found()
        );
        let record = store.get_metadata(&id, &ctx).await.unwrap();
        assert_eq!(record.checksum, checkpoint.checksum);
        assert_eq!(record.bytes, checkpoint.bytes);
    }

    let checkpoints = store.list_checkpoints(&id, &ctx).await.unwrap();
    assert_eq!(checkpoints, vec![checkpoint]);
}

#[tokio::test]
async fn test_upload_protocol() {
    let (store, storage) = memory_store();
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);

    let upload = store
        .presign_upload(
            PresignUploadRequest::new(owner.clone(), "image/png", Duration::from_secs(60))
                .with_filename("logo.png"),
            &ctx,
        )
        .await
        .unwrap();

    // Invisible until registered
    assert!(!store.exists(&upload.namespace_id, &ctx).await.unwrap());
    let err = store
        .register_uploaded(&upload.namespace_id, RegisterRequest::new(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    storage
        .accept_upload(&upload.upload_url, b"png bytes".to_vec())
        .await
        .unwrap();
    let record = store
        .register_uploaded(
            &upload.namespace_id,
            RegisterRequest::new().with_summary("company logo"),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(record.bytes, 9);
    assert_eq!(record.summary, "company logo");
    assert_eq!(
        store.read_namespace(&upload.namespace_id, None, &ctx).await.unwrap(),
        b"png bytes"
    );

    // Registering twice is refused
    assert!(
        store
            .register_uploaded(&upload.namespace_id, RegisterRequest::new(), &ctx)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_batch_partial_failure() {
    let (store, _) = memory_store();
    let result = store
        .store_batch(
            vec![
                BatchItem::new(b"a".to_vec(), "text/plain"),
                BatchItem::new(b"b".to_vec(), " "),
                BatchItem::new(b"c".to_vec(), "text/plain"),
            ],
            BatchOptions::default(),
        )
        .await;

    assert_eq!(result.results.len(), 3);
    assert_eq!(result.failed_count(), 1);
    assert!(matches!(result.results[1], Err(Error::Validation(_))));

    let ctx = result.context();
    let ids: Vec<_> = result.succeeded().cloned().collect();
    assert_eq!(store.retrieve(&ids[0], &ctx).await.unwrap(), b"a");
    assert_eq!(store.retrieve(&ids[1], &ctx).await.unwrap(), b"c");

    let listed = store
        .list_by_session(&result.session_id, None, &ctx)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn test_legacy_aliases_share_records() {
    let (store, _) = memory_store();
    let receipt = store
        .store(StoreRequest::new(b"legacy".to_vec(), "text/plain").with_session("s1"))
        .await
        .unwrap();
    assert_eq!(receipt.session_id, "s1");
    let ctx = receipt.context();

    assert_eq!(
        store.retrieve(&receipt.namespace_id, &ctx).await.unwrap(),
        store.read_namespace(&receipt.namespace_id, None, &ctx).await.unwrap()
    );
    assert_eq!(
        store.metadata(&receipt.namespace_id, &ctx).await.unwrap(),
        store.get_metadata(&receipt.namespace_id, &ctx).await.unwrap()
    );

    // Objects made through the namespace surface are reachable through the legacy one
    let id = text_blob(&store, &ScopeOwner::session("s1"), "modern").await;
    assert_eq!(store.retrieve(&id, &ctx).await.unwrap(), b"modern");

    assert!(store.delete(&receipt.namespace_id, &ctx).await.unwrap());
    assert!(
        store
            .retrieve(&receipt.namespace_id, &ctx)
            .await
            .unwrap_err()
            .is_not_found()
    );
}
