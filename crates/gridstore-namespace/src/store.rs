//! Namespace engine

use crate::keys;
use crate::locks::NamespaceLocks;
use crate::tree;
use crate::types::*;
use chrono::Utc;
use gridstore_cache::{MetadataCache, MetadataGateway, cache_from_config};
use gridstore_core::{
    AccessContext, Error, MetadataRecord, NamespaceContent, NamespaceId, NamespaceKind, Operation,
    Result, ScopeOwner, StoreConfig, StoredObject, WorkspaceEntry, check_access,
    normalize_subpath, with_deadline,
};
use gridstore_storage::{StorageProvider, provider_from_config};
use gridstore_telemetry::{NamespaceSpanAttributes, attributes, namespace_span};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span};

/// Coordinates namespaces over a storage provider and a metadata cache.
///
/// Every public operation checks access first, serializes mutations per
/// namespace id, stores immutable data objects and then publishes the
/// metadata record as the single visibility step.
///
/// # Example
///
/// ```no_run
/// use gridstore_core::{AccessContext, ScopeOwner, StoreConfig};
/// use gridstore_namespace::{CreateNamespaceRequest, NamespaceStore};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let store = NamespaceStore::from_config(StoreConfig::test_defaults())?;
/// let ctx = AccessContext::session("s1");
///
/// let id = store
///     .create_namespace(
///         CreateNamespaceRequest::blob(ScopeOwner::session("s1"), "text/plain")
///             .with_data(b"hello".to_vec()),
///         &ctx,
///     )
///     .await?;
/// assert_eq!(store.read_namespace(&id, None, &ctx).await?, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NamespaceStore {
    pub(crate) config: Arc<StoreConfig>,
    pub(crate) storage: Arc<dyn StorageProvider>,
    pub(crate) gateway: MetadataGateway,
    pub(crate) locks: NamespaceLocks,
}

impl NamespaceStore {
    pub fn new(
        config: Arc<StoreConfig>,
        storage: Arc<dyn StorageProvider>,
        cache: Arc<dyn MetadataCache>,
    ) -> Self {
        let gateway = MetadataGateway::new(&config, cache, storage.clone());
        Self {
            config,
            storage,
            gateway,
            locks: NamespaceLocks::new(),
        }
    }

    /// Build a store with the back-ends named in `config`
    pub fn from_config(config: StoreConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let storage = provider_from_config(&config)?;
        let cache = cache_from_config(&config)?;
        tracing::info!(
            sandbox_id = %config.sandbox_id,
            storage = storage.name(),
            cache = cache.name(),
            "namespace store ready"
        );
        Ok(Self::new(Arc::new(config), storage, cache))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn gateway(&self) -> &MetadataGateway {
        &self.gateway
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.storage
    }

    /// Create a Blob or Workspace namespace. The scope is fixed forever.
    pub async fn create_namespace(
        &self,
        req: CreateNamespaceRequest,
        ctx: &AccessContext,
    ) -> Result<NamespaceId> {
        let span = self.span("create", None);
        async move {
            req.validate(&self.config)?;
            check_access(Operation::Write, &req.owner, ctx)?;
            let timeout = self.timeout(ctx);

            let namespace_id = NamespaceId::generate();
            let _guard = self.locks.acquire(&namespace_id, timeout).await?;

            let mut record = MetadataRecord::new(
                namespace_id.clone(),
                self.config.sandbox_id.clone(),
                &req.owner,
                req.kind,
                req.mime,
            );
            record.filename = req.filename;
            record.summary = req.summary;
            record.tags = req.tags;
            record.custom_meta = req.custom_meta;
            if let (ScopeOwner::Session(_), Some(user_id)) = (&req.owner, req.user_id) {
                record.user_id = Some(user_id);
            }
            record.set_ttl(req.ttl)?;
            record.version = 1;
            Span::current().record(attributes::GRID_NAMESPACE_ID, namespace_id.as_str());
            record_span(&record);

            if req.kind == NamespaceKind::Blob {
                let key = keys::version_key(&record, 1, None)?;
                let object = self
                    .store_object(key, req.data.unwrap_or_default(), None, timeout)
                    .await?;
                record.content = NamespaceContent::Blob {
                    object: Some(object),
                };
            }
            record.refresh_aggregates();

            self.publish(&record, timeout).await;
            record_outcome(&record);
            tracing::debug!(
                namespace_id = %namespace_id,
                kind = record.kind().as_str(),
                scope = %record.scope,
                "created namespace"
            );
            Ok(namespace_id)
        }
        .instrument(span)
        .await
    }

    /// Replace the blob payload or write one workspace file. Returns the new version.
    pub async fn write_namespace(
        &self,
        namespace_id: &NamespaceId,
        req: WriteRequest,
        ctx: &AccessContext,
    ) -> Result<u64> {
        let span = self.span("write", Some(namespace_id));
        async move {
            req.validate(&self.config)?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            let WriteRequest { path, data, mime } = req;
            let path = path.as_deref().map(normalize_subpath).transpose()?.flatten();
            let version = record.version + 1;

            match (record.kind(), path) {
                (NamespaceKind::Blob, None) => {
                    let key = keys::version_key(&record, version, None)?;
                    let object = self.store_object(key, data, None, timeout).await?;
                    if let Some(mime) = mime {
                        record.mime = mime;
                    }
                    record.content = NamespaceContent::Blob {
                        object: Some(object),
                    };
                }
                (NamespaceKind::Blob, Some(_)) => {
                    return Err(Error::validation("blob namespaces do not take a file path"));
                }
                (NamespaceKind::Workspace, None) => {
                    return Err(Error::validation("workspace writes need a file path"));
                }
                (NamespaceKind::Workspace, Some(path)) => {
                    tree::check_file_slot(workspace_entries(&mut record)?, &path)?;
                    let key = keys::version_key(&record, version, Some(&path))?;
                    let object = self.store_object(key, data, mime, timeout).await?;
                    workspace_entries(&mut record)?.insert(path, WorkspaceEntry::File { object });
                }
            }

            self.commit(&mut record, version, timeout).await;
            Ok(version)
        }
        .instrument(span)
        .await
    }

    /// Read the blob payload (`path = None`) or one workspace file
    pub async fn read_namespace(
        &self,
        namespace_id: &NamespaceId,
        path: Option<&str>,
        ctx: &AccessContext,
    ) -> Result<Vec<u8>> {
        let span = self.span("read", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let mut record = self.load(Operation::Read, namespace_id, ctx, timeout).await?;
            let mut retried = false;

            loop {
                let Some(object) = resolve_object(&record, path)? else {
                    return Ok(Vec::new());
                };
                match with_deadline("storage.get", timeout, self.storage.get(&object.key)).await {
                    Ok(data) => {
                        Span::current().record(attributes::GRID_BYTES, data.len() as u64);
                        return Ok(data);
                    }
                    // The object may have been superseded and reclaimed after
                    // the record was loaded; read the newer version instead
                    Err(Error::Provider(reason)) if !retried => {
                        let current = self.load(Operation::Read, namespace_id, ctx, timeout).await?;
                        if current.version == record.version {
                            return Err(Error::Provider(reason));
                        }
                        tracing::debug!(
                            namespace_id = %namespace_id,
                            loaded = record.version,
                            current = current.version,
                            "object went away during read; retrying at the current version"
                        );
                        record = current;
                        retried = true;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Delete a namespace with all of its data and checkpoints.
    ///
    /// Returns false when there was nothing live to delete.
    pub async fn delete_namespace(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
    ) -> Result<bool> {
        let span = self.span("delete", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;

            let Some(record) = self.gateway.fetch(namespace_id, timeout).await? else {
                return Ok(false);
            };
            check_access(Operation::Delete, &record.owner()?, ctx)?;
            record_span(&record);

            let removed = self.purge(&record, timeout).await?;
            tracing::debug!(namespace_id = %namespace_id, objects = removed, "deleted namespace");
            Ok(!record.is_expired())
        }
        .instrument(span)
        .await
    }

    /// Copy a namespace to a fresh id under the same owner
    pub async fn copy_namespace(
        &self,
        namespace_id: &NamespaceId,
        options: CopyOptions,
        ctx: &AccessContext,
    ) -> Result<NamespaceId> {
        let span = self.span("copy", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let _source_guard = self.locks.acquire(namespace_id, timeout).await?;
            let source = self.load(Operation::Read, namespace_id, ctx, timeout).await?;

            let owner = source.owner()?;
            if let Some(target) = &options.target_owner
                && target != &owner
            {
                return Err(Error::validation(
                    "copies stay within the scope and owner of the source namespace",
                ));
            }
            check_access(Operation::Write, &owner, ctx)?;

            let copy_id = NamespaceId::generate();
            let _copy_guard = self.locks.acquire(&copy_id, timeout).await?;

            let now = Utc::now();
            let mut copy = source.clone();
            copy.namespace_id = copy_id.clone();
            copy.created_at = now;
            copy.updated_at = now;
            copy.version = 1;
            copy.checkpoint_seq = 0;
            copy.filename = options.filename.or(source.filename);
            let content = self
                .relocate(
                    &source.content,
                    |entry| keys::version_key(&copy, 1, entry),
                    timeout,
                )
                .await?;
            copy.content = content;
            copy.refresh_aggregates();

            self.publish(&copy, timeout).await;
            tracing::debug!(source = %namespace_id, copy = %copy_id, "copied namespace");
            Ok(copy_id)
        }
        .instrument(span)
        .await
    }

    /// Relabel a namespace. Content and version are unchanged.
    pub async fn move_namespace(
        &self,
        namespace_id: &NamespaceId,
        new_label: impl Into<String>,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let new_label = new_label.into();
        let span = self.span("move", Some(namespace_id));
        async move {
            if new_label.trim().is_empty() {
                return Err(Error::validation("label must not be empty"));
            }
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            record.filename = Some(new_label);
            record.updated_at = Utc::now();
            self.publish(&record, timeout).await;
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Live namespaces of one owner.
    ///
    /// A brute-force scan of the sandbox's metadata; the order of the
    /// returned records is undefined.
    pub async fn list_namespaces(
        &self,
        owner: &ScopeOwner,
        filter: &NamespaceFilter,
        ctx: &AccessContext,
    ) -> Result<Vec<MetadataRecord>> {
        let span = self.span("list", None);
        async move {
            owner.validate()?;
            check_access(Operation::Read, owner, ctx)?;
            self.scan_owner(owner, |record| filter.matches(record), filter.limit, self.timeout(ctx))
                .await
        }
        .instrument(span)
        .await
    }

    /// Like [`Self::list_namespaces`], with every predicate of `query`
    /// applied in memory. Order is undefined.
    pub async fn search_namespaces(
        &self,
        owner: &ScopeOwner,
        query: &SearchQuery,
        ctx: &AccessContext,
    ) -> Result<Vec<MetadataRecord>> {
        let span = self.span("search", None);
        async move {
            owner.validate()?;
            check_access(Operation::Read, owner, ctx)?;
            self.scan_owner(
                owner,
                |record| query.matches(record),
                query.filter.limit,
                self.timeout(ctx),
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// Namespaces of one session, the legacy listing call
    pub async fn list_by_session(
        &self,
        session_id: &str,
        limit: Option<usize>,
        ctx: &AccessContext,
    ) -> Result<Vec<MetadataRecord>> {
        let filter = NamespaceFilter {
            kind: None,
            limit,
        };
        self.list_namespaces(&ScopeOwner::session(session_id), &filter, ctx)
            .await
    }

    pub async fn get_metadata(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let span = self.span("metadata", Some(namespace_id));
        async move {
            self.load(Operation::Read, namespace_id, ctx, self.timeout(ctx))
                .await
        }
        .instrument(span)
        .await
    }

    /// Apply a partial metadata update. Does not bump the version.
    pub async fn update_metadata(
        &self,
        namespace_id: &NamespaceId,
        update: MetadataUpdate,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let span = self.span("update_metadata", Some(namespace_id));
        async move {
            if update.filename.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(Error::validation("filename must not be empty"));
            }
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;
            if update.is_empty() {
                return Ok(record);
            }

            let MetadataUpdate {
                summary,
                filename,
                tags,
                custom_meta,
            } = update;
            if let Some(summary) = summary {
                record.summary = summary;
            }
            if filename.is_some() {
                record.filename = filename;
            }
            if let Some(tags) = tags {
                record.tags = tags;
            }
            record.custom_meta.extend(custom_meta);
            record.updated_at = Utc::now();

            self.publish(&record, timeout).await;
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Push the expiry of a live namespace back by `extra`.
    ///
    /// A namespace without an expiry keeps living forever.
    pub async fn extend_ttl(
        &self,
        namespace_id: &NamespaceId,
        extra: Duration,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let span = self.span("extend_ttl", Some(namespace_id));
        async move {
            let extra = gridstore_core::record::to_chrono(extra)?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            let Some(expires_at) = record.expires_at else {
                tracing::debug!(namespace_id = %namespace_id, "namespace never expires; nothing to extend");
                return Ok(record);
            };
            record.expires_at = Some(expires_at.max(Utc::now()) + extra);
            record.updated_at = Utc::now();

            self.publish(&record, timeout).await;
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Whether the namespace is live and readable by `ctx`.
    ///
    /// Access denials are still reported as errors.
    pub async fn exists(&self, namespace_id: &NamespaceId, ctx: &AccessContext) -> Result<bool> {
        match self
            .load(Operation::Read, namespace_id, ctx, self.timeout(ctx))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Time-limited direct download URL for the blob payload or a workspace file
    pub async fn presign_download(
        &self,
        namespace_id: &NamespaceId,
        path: Option<&str>,
        duration: PresignDuration,
        ctx: &AccessContext,
    ) -> Result<String> {
        let span = self.span("presign_download", Some(namespace_id));
        async move {
            let expires = duration.resolve(&self.config)?;
            let timeout = self.timeout(ctx);
            let record = self.load(Operation::Read, namespace_id, ctx, timeout).await?;

            let object = resolve_object(&record, path)?
                .ok_or_else(|| Error::NamespaceNotFound(namespace_id.to_string()))?;
            with_deadline(
                "storage.presign_get",
                timeout,
                self.storage.presign_get(&object.key, expires),
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// Make an explicit directory in a workspace. Returns the namespace version.
    pub async fn make_directory(
        &self,
        namespace_id: &NamespaceId,
        path: &str,
        ctx: &AccessContext,
    ) -> Result<u64> {
        let span = self.span("make_directory", Some(namespace_id));
        async move {
            let path = normalize_subpath(path)?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            let current = record.version;
            let entries = workspace_entries(&mut record)?;
            let Some(path) = path else {
                return Ok(current);
            };
            if entries.get(&path).is_some_and(WorkspaceEntry::is_directory) {
                return Ok(current);
            }
            tree::check_directory_slot(entries, &path)?;
            entries.insert(
                path,
                WorkspaceEntry::Directory {
                    created_at: Utc::now(),
                },
            );

            self.commit(&mut record, current + 1, timeout).await;
            Ok(current + 1)
        }
        .instrument(span)
        .await
    }

    /// Immediate children of a workspace directory (`None` is the root)
    pub async fn list_entries(
        &self,
        namespace_id: &NamespaceId,
        dir: Option<&str>,
        ctx: &AccessContext,
    ) -> Result<Vec<EntryInfo>> {
        let span = self.span("list_entries", Some(namespace_id));
        async move {
            let dir = dir.map(normalize_subpath).transpose()?.flatten();
            let mut record = self
                .load(Operation::Read, namespace_id, ctx, self.timeout(ctx))
                .await?;
            tree::children(namespace_id, workspace_entries(&mut record)?, dir.as_deref())
        }
        .instrument(span)
        .await
    }

    /// Remove a workspace file or directory subtree. Returns whether anything
    /// was removed.
    pub async fn remove_entry(
        &self,
        namespace_id: &NamespaceId,
        path: &str,
        ctx: &AccessContext,
    ) -> Result<bool> {
        let span = self.span("remove_entry", Some(namespace_id));
        async move {
            let path = normalize_subpath(path)?
                .ok_or_else(|| Error::validation("cannot remove the workspace root"))?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            if tree::remove(workspace_entries(&mut record)?, &path) == 0 {
                return Ok(false);
            }
            let version = record.version + 1;
            self.commit(&mut record, version, timeout).await;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Copy a workspace file or directory subtree to `to`. Returns the new version.
    ///
    /// A file may replace another file; a directory needs a vacant destination.
    pub async fn copy_file(
        &self,
        namespace_id: &NamespaceId,
        from: &str,
        to: &str,
        ctx: &AccessContext,
    ) -> Result<u64> {
        self.transfer_entries("copy_file", namespace_id, from, to, false, ctx)
            .await
    }

    /// Like [`Self::copy_file`], then drops the source. Returns the new version.
    pub async fn move_file(
        &self,
        namespace_id: &NamespaceId,
        from: &str,
        to: &str,
        ctx: &AccessContext,
    ) -> Result<u64> {
        self.transfer_entries("move_file", namespace_id, from, to, true, ctx)
            .await
    }

    async fn transfer_entries(
        &self,
        operation: &str,
        namespace_id: &NamespaceId,
        from: &str,
        to: &str,
        remove_source: bool,
        ctx: &AccessContext,
    ) -> Result<u64> {
        let span = self.span(operation, Some(namespace_id));
        async move {
            let from = normalize_subpath(from)?
                .ok_or_else(|| Error::validation("the workspace root cannot be copied or moved"))?;
            let to = normalize_subpath(to)?
                .ok_or_else(|| Error::validation("the workspace root cannot be replaced"))?;
            if to == from || to.starts_with(&format!("{}/", from)) {
                return Err(Error::validation(format!(
                    "cannot place '{}' inside itself",
                    from
                )));
            }

            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;
            let version = record.version + 1;

            let entries = workspace_entries(&mut record)?;
            let source = tree::subtree(entries, &from);
            if source.is_empty() {
                return Err(Error::NamespaceNotFound(format!("{}/{}", namespace_id, from)));
            }
            if tree::is_directory(entries, &from) {
                tree::check_vacant(entries, &to)?;
            } else {
                tree::check_file_slot(entries, &to)?;
            }

            let mut placed = Vec::with_capacity(source.len());
            for (path, entry) in source {
                let target = format!("{}{}", to, &path[from.len()..]);
                let entry = match entry {
                    WorkspaceEntry::File { object } => {
                        let key = keys::version_key(&record, version, Some(&target))?;
                        WorkspaceEntry::File {
                            object: self.copy_object(&object, key, timeout).await?,
                        }
                    }
                    WorkspaceEntry::Directory { .. } => WorkspaceEntry::Directory {
                        created_at: Utc::now(),
                    },
                };
                placed.push((target, entry));
            }

            let entries = workspace_entries(&mut record)?;
            if remove_source {
                tree::remove(entries, &from);
            }
            let count = placed.len();
            entries.extend(placed);

            self.commit(&mut record, version, timeout).await;
            tracing::debug!(
                namespace_id = %namespace_id,
                from = %from,
                to = %to,
                entries = count,
                moved = remove_source,
                "transferred workspace entries"
            );
            Ok(version)
        }
        .instrument(span)
        .await
    }

    // ---- shared plumbing ----

    pub(crate) fn timeout(&self, ctx: &AccessContext) -> Duration {
        ctx.timeout.unwrap_or_else(|| self.config.operation_timeout())
    }

    pub(crate) fn span(&self, operation: &str, namespace_id: Option<&NamespaceId>) -> Span {
        let mut attrs = NamespaceSpanAttributes::new(operation, self.config.sandbox_id.as_str());
        if let Some(namespace_id) = namespace_id {
            attrs = attrs.with_namespace(namespace_id.as_str());
        }
        namespace_span(&attrs)
    }

    /// Fetch a record and authorize `operation` on it.
    ///
    /// Access is decided before anything else about the record is disclosed.
    /// Pending records are reported as absent; expired ones as
    /// [`Error::Expired`], with their removal scheduled.
    pub(crate) async fn load(
        &self,
        operation: Operation,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
        timeout: Duration,
    ) -> Result<MetadataRecord> {
        let record = self
            .gateway
            .fetch(namespace_id, timeout)
            .await?
            .ok_or_else(|| Error::NamespaceNotFound(namespace_id.to_string()))?;

        check_access(operation, &record.owner()?, ctx)?;

        if !record.is_committed() {
            return Err(Error::NamespaceNotFound(namespace_id.to_string()));
        }
        if record.is_expired() {
            tracing::warn!(namespace_id = %namespace_id, "namespace expired; scheduling removal");
            self.gateway.schedule_expiry(namespace_id.clone(), timeout);
            return Err(Error::Expired(namespace_id.to_string()));
        }

        record_span(&record);
        Ok(record)
    }

    /// Publish a record after its data objects landed.
    ///
    /// A failure here leaves the new objects unreferenced; the call still
    /// succeeds and sweep reclaims them.
    pub(crate) async fn publish(&self, record: &MetadataRecord, timeout: Duration) {
        if let Err(err) = self.gateway.put(record, timeout).await {
            tracing::error!(
                namespace_id = %record.namespace_id,
                version = record.version,
                error = %err,
                "storage write succeeded but metadata publish failed"
            );
        }
    }

    /// Bump to `version`, refresh aggregates and publish
    pub(crate) async fn commit(&self, record: &mut MetadataRecord, version: u64, timeout: Duration) {
        record.version = version;
        record.updated_at = Utc::now();
        record.refresh_aggregates();
        self.publish(record, timeout).await;
        record_outcome(record);
    }

    pub(crate) async fn store_object(
        &self,
        key: String,
        data: Vec<u8>,
        mime: Option<String>,
        timeout: Duration,
    ) -> Result<StoredObject> {
        let bytes = data.len() as u64;
        let checksum = with_deadline("storage.put", timeout, self.storage.put(&key, data)).await?;
        Ok(StoredObject {
            key,
            bytes,
            checksum,
            mime,
            modified_at: Utc::now(),
        })
    }

    /// Copy every object of `content` to the key chosen by `target`
    /// (`None` for the blob payload, the entry path for workspace files)
    pub(crate) async fn relocate<F>(
        &self,
        content: &NamespaceContent,
        target: F,
        timeout: Duration,
    ) -> Result<NamespaceContent>
    where
        F: Fn(Option<&str>) -> Result<String>,
    {
        match content {
            NamespaceContent::Blob { object } => {
                let object = match object {
                    Some(object) => Some(self.copy_object(object, target(None)?, timeout).await?),
                    None => None,
                };
                Ok(NamespaceContent::Blob { object })
            }
            NamespaceContent::Workspace { entries } => {
                let mut copied = BTreeMap::new();
                for (path, entry) in entries {
                    let entry = match entry {
                        WorkspaceEntry::File { object } => WorkspaceEntry::File {
                            object: self
                                .copy_object(object, target(Some(path))?, timeout)
                                .await?,
                        },
                        directory => directory.clone(),
                    };
                    copied.insert(path.clone(), entry);
                }
                Ok(NamespaceContent::Workspace { entries: copied })
            }
        }
    }

    async fn copy_object(
        &self,
        source: &StoredObject,
        key: String,
        timeout: Duration,
    ) -> Result<StoredObject> {
        let checksum =
            with_deadline("storage.copy", timeout, self.storage.copy(&source.key, &key)).await?;
        if checksum != source.checksum {
            return Err(Error::provider(format!(
                "checksum mismatch copying '{}'",
                source.key
            )));
        }
        Ok(StoredObject {
            key,
            checksum,
            ..source.clone()
        })
    }

    /// Delete every object under `prefix`. Returns how many were deleted.
    pub(crate) async fn delete_prefix(&self, prefix: &str, timeout: Duration) -> Result<usize> {
        let keys = with_deadline("storage.list", timeout, self.storage.list(prefix)).await?;
        self.delete_keys(&keys, timeout).await
    }

    pub(crate) async fn delete_keys(&self, keys: &[String], timeout: Duration) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            if with_deadline("storage.delete", timeout, self.storage.delete(key)).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Remove a namespace's data, checkpoints and metadata. Caller holds the lock.
    pub(crate) async fn purge(&self, record: &MetadataRecord, timeout: Duration) -> Result<usize> {
        let mut removed = self.delete_prefix(&keys::data_prefix(record)?, timeout).await?;
        removed += self
            .delete_prefix(
                &keys::checkpoint_prefix(&self.config.sandbox_id, &record.namespace_id),
                timeout,
            )
            .await?;
        self.gateway.remove(&record.namespace_id, timeout).await?;
        Ok(removed)
    }

    async fn scan_owner<P>(
        &self,
        owner: &ScopeOwner,
        predicate: P,
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<MetadataRecord>>
    where
        P: Fn(&MetadataRecord) -> bool,
    {
        let now = Utc::now();
        let records = self
            .gateway
            .scan(timeout)
            .await?
            .into_iter()
            .filter(|record| record.owner().is_ok_and(|o| &o == owner))
            .filter(|record| record.is_committed() && !record.is_expired_at(now))
            .filter(|record| predicate(record))
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(records)
    }
}

fn record_span(record: &MetadataRecord) {
    let span = Span::current();
    span.record(attributes::GRID_SCOPE, record.scope.as_str());
    span.record(attributes::GRID_NAMESPACE_KIND, record.kind().as_str());
    if let Ok(path) = record.grid_path() {
        span.record(attributes::GRID_PATH, path.as_str());
    }
}

fn record_outcome(record: &MetadataRecord) {
    let span = Span::current();
    span.record(attributes::GRID_VERSION, record.version);
    span.record(attributes::GRID_BYTES, record.bytes);
}

fn workspace_entries(
    record: &mut MetadataRecord,
) -> Result<&mut BTreeMap<String, WorkspaceEntry>> {
    match &mut record.content {
        NamespaceContent::Workspace { entries } => Ok(entries),
        NamespaceContent::Blob { .. } => Err(Error::validation(format!(
            "'{}' is a blob namespace, not a workspace",
            record.namespace_id
        ))),
    }
}

/// Object addressed by a read: the blob payload or one workspace file
fn resolve_object<'a>(
    record: &'a MetadataRecord,
    path: Option<&str>,
) -> Result<Option<&'a StoredObject>> {
    let path = path.map(normalize_subpath).transpose()?.flatten();
    match (&record.content, path) {
        (NamespaceContent::Blob { object }, None) => Ok(object.as_ref()),
        (NamespaceContent::Blob { .. }, Some(_)) => {
            Err(Error::validation("blob namespaces do not take a file path"))
        }
        (NamespaceContent::Workspace { .. }, None) => {
            Err(Error::validation("workspace reads need a file path"))
        }
        (NamespaceContent::Workspace { entries }, Some(path)) => match entries.get(&path) {
            Some(WorkspaceEntry::File { object }) => Ok(Some(object)),
            Some(WorkspaceEntry::Directory { .. }) => {
                Err(Error::validation(format!("'{}' is a directory", path)))
            }
            None => Err(Error::NamespaceNotFound(format!(
                "{}/{}",
                record.namespace_id, path
            ))),
        },
    }
}
