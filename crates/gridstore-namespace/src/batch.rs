//! Batch store with per-item results

use crate::NamespaceStore;
use crate::legacy::allocate_session_id;
use crate::types::{BatchItem, BatchOptions, StoreRequest};
use futures::future::join_all;
use gridstore_core::{AccessContext, NamespaceId, Result};
use tracing::Instrument;

/// Outcome of [`NamespaceStore::store_batch`]
#[derive(Debug)]
pub struct BatchResult {
    /// Session every item was stored under
    pub session_id: String,
    /// One slot per input item, in input order
    pub results: Vec<Result<NamespaceId>>,
}

impl BatchResult {
    pub fn context(&self) -> AccessContext {
        AccessContext::session(self.session_id.clone())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &NamespaceId> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }
}

impl NamespaceStore {
    /// Store every item independently under one session.
    ///
    /// A failing item never aborts or rolls back its siblings.
    pub async fn store_batch(&self, items: Vec<BatchItem>, options: BatchOptions) -> BatchResult {
        let span = self.span("store_batch", None);
        async move {
            let session_id = options.session_id.unwrap_or_else(allocate_session_id);

            let stores = items.into_iter().map(|item| {
                let mut req = StoreRequest::new(item.data, item.mime)
                    .with_summary(item.summary)
                    .with_session(session_id.clone());
                req.filename = item.filename;
                req.custom_meta = item.custom_meta;
                req.user_id = options.user_id.clone();
                req.ttl = options.ttl;
                async move { self.store(req).await.map(|receipt| receipt.namespace_id) }
            });
            let results = join_all(stores).await;

            let failed = results.iter().filter(|r| r.is_err()).count();
            if failed > 0 {
                tracing::warn!(
                    session_id = %session_id,
                    total = results.len(),
                    failed,
                    "batch store finished with failures"
                );
            } else {
                tracing::debug!(session_id = %session_id, total = results.len(), "batch store finished");
            }

            BatchResult {
                session_id,
                results,
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstore_cache::InMemoryMetadataCache;
    use gridstore_core::{Error, StoreConfig};
    use gridstore_storage::InMemoryStorageProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn store() -> NamespaceStore {
        NamespaceStore::new(
            Arc::new(StoreConfig::test_defaults()),
            Arc::new(InMemoryStorageProvider::new()),
            Arc::new(InMemoryMetadataCache::new()),
        )
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let store = store();
        let batch = store
            .store_batch(
                vec![
                    BatchItem::new(b"one".to_vec(), "text/plain"),
                    BatchItem::new(b"two".to_vec(), ""),
                    BatchItem::new(b"three".to_vec(), "text/plain"),
                ],
                BatchOptions::default(),
            )
            .await;

        assert_eq!(batch.results.len(), 3);
        assert!(matches!(batch.results[1], Err(Error::Validation(_))));
        assert_eq!(batch.failed_count(), 1);

        let ctx = batch.context();
        let ids: Vec<_> = batch.succeeded().cloned().collect();
        assert_eq!(store.retrieve(&ids[0], &ctx).await.unwrap(), b"one");
        assert_eq!(store.retrieve(&ids[1], &ctx).await.unwrap(), b"three");
    }

    #[tokio::test]
    async fn test_shared_session_and_ttl() {
        let store = store();
        let batch = store
            .store_batch(
                vec![
                    BatchItem::new(b"a".to_vec(), "text/plain"),
                    BatchItem::new(b"b".to_vec(), "text/plain"),
                ],
                BatchOptions {
                    session_id: Some("batch-session".to_string()),
                    user_id: None,
                    ttl: Some(Duration::from_secs(60)),
                },
            )
            .await;

        assert_eq!(batch.session_id, "batch-session");
        let listed = store
            .list_by_session("batch-session", None, &batch.context())
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        for record in listed {
            let ttl = record.expires_at.unwrap() - record.created_at;
            assert!((ttl - chrono::Duration::seconds(60)).num_seconds().abs() < 5);
        }
    }
}
