//! Store and namespace statistics

use crate::NamespaceStore;
use crate::types::{StorageStats, StoreStats};
use chrono::Utc;
use gridstore_core::{
    AccessContext, NamespaceContent, NamespaceId, NamespaceKind, Operation, Result, WorkspaceEntry,
};
use std::collections::BTreeSet;
use tracing::Instrument;

impl NamespaceStore {
    /// Sandbox-wide counts from a scan of every metadata record
    pub async fn get_stats(&self) -> Result<StoreStats> {
        let span = self.span("stats", None);
        async move {
            let records = self.gateway.scan(self.config.operation_timeout()).await?;
            let now = Utc::now();

            let mut stats = StoreStats {
                sandbox_id: self.config.sandbox_id.clone(),
                storage_provider: self.storage.name().to_string(),
                cache_provider: self.gateway.cache_name().to_string(),
                ..StoreStats::default()
            };
            for record in records {
                if record.is_expired_at(now) {
                    stats.expired += 1;
                    continue;
                }
                if !record.is_committed() {
                    stats.pending_uploads += 1;
                    continue;
                }
                stats.namespaces += 1;
                match record.kind() {
                    NamespaceKind::Blob => stats.blobs += 1,
                    NamespaceKind::Workspace => stats.workspaces += 1,
                }
                *stats
                    .by_scope
                    .entry(record.scope.as_str().to_string())
                    .or_default() += 1;
                stats.bytes += record.bytes;
            }
            Ok(stats)
        }
        .instrument(span)
        .await
    }

    /// File, directory and byte counts of one namespace plus its checkpoint count
    pub async fn get_storage_stats(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
    ) -> Result<StorageStats> {
        let span = self.span("storage_stats", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let record = self.load(Operation::Read, namespace_id, ctx, timeout).await?;
            let checkpoints = self.read_checkpoints(namespace_id, timeout).await?.len();

            let (total_files, total_directories) = match &record.content {
                NamespaceContent::Blob { object } => (usize::from(object.is_some()), 0),
                NamespaceContent::Workspace { entries } => {
                    let mut directories = BTreeSet::new();
                    let mut files = 0;
                    for (path, entry) in entries {
                        match entry {
                            WorkspaceEntry::File { .. } => files += 1,
                            WorkspaceEntry::Directory { .. } => {
                                directories.insert(path.as_str());
                            }
                        }
                        // Ancestors count even when only implied by their children
                        directories.extend(path.match_indices('/').map(|(idx, _)| &path[..idx]));
                    }
                    (files, directories.len())
                }
            };

            Ok(StorageStats {
                namespace_id: namespace_id.clone(),
                kind: record.kind(),
                version: record.version,
                total_files,
                total_directories,
                total_bytes: record.bytes,
                checkpoints,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckpointRequest, CreateNamespaceRequest, PresignUploadRequest, WriteRequest};
    use gridstore_cache::InMemoryMetadataCache;
    use gridstore_core::{Error, ScopeOwner, StoreConfig};
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
    async fn test_store_stats() {
        let store = store();
        let session = AccessContext::session("s1");
        let alice = AccessContext::user("alice");

        store
            .create_namespace(
                CreateNamespaceRequest::blob(ScopeOwner::session("s1"), "text/plain")
                    .with_data(b"hello".to_vec()),
                &session,
            )
            .await
            .unwrap();
        let workspace = store
            .create_namespace(CreateNamespaceRequest::workspace(ScopeOwner::user("alice")), &alice)
            .await
            .unwrap();
        store
            .write_namespace(&workspace, WriteRequest::file("a.txt", b"abc".to_vec()), &alice)
            .await
            .unwrap();
        store
            .presign_upload(
                PresignUploadRequest::new(ScopeOwner::user("alice"), "image/png", Duration::from_secs(60)),
                &alice,
            )
            .await
            .unwrap();

        let stats = store.get_stats().await.unwrap();
        assert_eq!(stats.sandbox_id, "test-sandbox");
        assert_eq!(stats.storage_provider, "memory");
        assert_eq!(stats.cache_provider, "memory");
        assert_eq!((stats.namespaces, stats.blobs, stats.workspaces), (2, 1, 1));
        assert_eq!(stats.pending_uploads, 1);
        assert_eq!(stats.bytes, 8);
        assert_eq!(stats.by_scope.get("session"), Some(&1));
        assert_eq!(stats.by_scope.get("user"), Some(&1));
    }

    #[tokio::test]
    async fn test_namespace_storage_stats() {
        let store = store();
        let ctx = AccessContext::user("alice");
        let id = store
            .create_namespace(CreateNamespaceRequest::workspace(ScopeOwner::user("alice")), &ctx)
            .await
            .unwrap();
        store
            .write_namespace(&id, WriteRequest::file("src/bin/main.rs", b"fn main() {}".to_vec()), &ctx)
            .await
            .unwrap();
        store
            .write_namespace(&id, WriteRequest::file("README.md", b"# hi".to_vec()), &ctx)
            .await
            .unwrap();
        store.make_directory(&id, "empty", &ctx).await.unwrap();
        store
            .checkpoint_namespace(&id, CheckpointRequest::new("one"), &ctx)
            .await
            .unwrap();

        let stats = store.get_storage_stats(&id, &ctx).await.unwrap();
        assert_eq!(stats.kind, NamespaceKind::Workspace);
        assert_eq!(stats.version, 4);
        assert_eq!(stats.total_files, 2);
        // src, src/bin, empty
        assert_eq!(stats.total_directories, 3);
        assert_eq!(stats.total_bytes, 16);
        assert_eq!(stats.checkpoints, 1);

        let err = store
            .get_storage_stats(&id, &AccessContext::user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AccessDenied { .. }));
    }
}
