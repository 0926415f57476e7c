// Expiry, concurrency and reclamation tests

mod common;

use common::{memory_store, text_blob};
use futures::future::join_all;
use gridstore_core::{AccessContext, Error, ScopeOwner};
use gridstore_namespace::{CreateNamespaceRequest, NamespaceFilter, WriteRequest};
use std::time::Duration;

#[tokio::test]
async fn test_ttl_expiry() {
    let (store, storage) = memory_store();
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);

    let short = store
        .create_namespace(
            CreateNamespaceRequest::blob(owner.clone(), "text/plain")
                .with_data(b"brief".to_vec())
                .with_ttl(Duration::from_secs(1)),
            &ctx,
        )
        .await
        .unwrap();
    let forever = text_blob(&store, &owner, "lasting").await;
    assert_eq!(store.read_namespace(&short, None, &ctx).await.unwrap(), b"brief");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let err = store.read_namespace(&short, None, &ctx).await.unwrap_err();
    assert!(matches!(err, Error::Expired(_)));
    assert!(!store.exists(&short, &ctx).await.unwrap());

    let listed = store
        .list_namespaces(&owner, &NamespaceFilter::default(), &ctx)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].namespace_id, forever);

    // Sweep removes what lazy expiry left behind
    store.sweep().await.unwrap();
    assert!(
        store
            .read_namespace(&short, None, &ctx)
            .await
            .unwrap_err()
            .is_not_found()
    );
    // Payload and metadata of the surviving blob
    assert_eq!(storage.len().await, 2);
}

#[tokio::test]
async fn test_extend_ttl_keeps_namespace_alive() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::user("alice");
    let ctx = AccessContext::for_owner(&owner);
    let id = store
        .create_namespace(
            CreateNamespaceRequest::blob(owner, "text/plain").with_ttl(Duration::from_secs(1)),
            &ctx,
        )
        .await
        .unwrap();

    store
        .extend_ttl(&id, Duration::from_secs(60), &ctx)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(store.exists(&id, &ctx).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_writes_serialize() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::user("alice");
    let ctx = AccessContext::for_owner(&owner);
    let id = store
        .create_namespace(CreateNamespaceRequest::workspace(owner), &ctx)
        .await
        .unwrap();

    let writes = (0..10).map(|i| {
        let store = store.clone();
        let ctx = ctx.clone();
        let id = id.clone();
        async move {
            store
                .write_namespace(
                    &id,
                    WriteRequest::file(format!("file-{i}.txt"), vec![b'x'; i + 1]),
                    &ctx,
                )
                .await
        }
    });
    let mut versions: Vec<u64> = join_all(writes)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (2..=11).collect::<Vec<_>>());

    let record = store.get_metadata(&id, &ctx).await.unwrap();
    assert_eq!(record.version, 11);
    assert_eq!(record.bytes, (1..=10).sum::<u64>());
    assert_eq!(store.list_entries(&id, None, &ctx).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_reads_see_whole_versions() {
    let (store, _) = memory_store();
    let owner = ScopeOwner::session("s1");
    let ctx = AccessContext::for_owner(&owner);
    let id = text_blob(&store, &owner, "aaaa").await;

    let writer = async {
        for payload in ["bbbb", "cccc", "dddd"] {
            store
                .write_namespace(&id, WriteRequest::blob(payload.as_bytes().to_vec()), &ctx)
                .await
                .unwrap();
        }
    };
    let reader = async {
        for _ in 0..20 {
            let data = store.read_namespace(&id, None, &ctx).await.unwrap();
            assert_eq!(data.len(), 4);
            assert!(data.iter().all(|b| *b == data[0]));
            tokio::task::yield_now().await;
        }
    };
    tokio::join!(writer, reader);
}
