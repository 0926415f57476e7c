//! Write-through metadata gateway

use crate::MetadataCache;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gridstore_core::{Error, MetadataRecord, NamespaceId, Result, StoreConfig, with_deadline};
use gridstore_storage::StorageProvider;
use std::sync::Arc;
use std::time::Duration;

const DURABLE_ROOT: &str = "metadata";
const CACHE_NAMESPACE: &str = "gridstore";
const DEFAULT_PUBLISHED_LIMIT: usize = 4096;
/// Last-write stamps older than this many operation timeouts are forgotten
const PUBLISHED_RETENTION_TIMEOUTS: u32 = 4;

/// Metadata access for one sandbox.
///
/// Cheap to clone; clones share the same back-ends and last-write table.
#[derive(Clone)]
pub struct MetadataGateway {
    cache: Arc<dyn MetadataCache>,
    durable: Arc<dyn StorageProvider>,
    sandbox_id: String,
    /// Last `updated_at` this gateway published per namespace.
    ///
    /// Trimmed back to recent stamps once it grows past `published_limit`;
    /// a put old enough to have lost its stamp has outlived its deadline.
    published: Arc<DashMap<NamespaceId, DateTime<Utc>>>,
    published_limit: usize,
}

impl MetadataGateway {
    pub fn new(
        config: &StoreConfig,
        cache: Arc<dyn MetadataCache>,
        durable: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            cache,
            durable,
            sandbox_id: config.sandbox_id.clone(),
            published: Arc::new(DashMap::new()),
            published_limit: DEFAULT_PUBLISHED_LIMIT,
        }
    }

    /// Number of last-write stamps kept before old ones are trimmed
    pub fn with_published_limit(mut self, limit: usize) -> Self {
        self.published_limit = limit;
        self
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    /// Name of the cache back-end
    pub fn cache_name(&self) -> &str {
        self.cache.name()
    }

    pub fn cache_key(&self, namespace_id: &NamespaceId) -> String {
        format!("{}:{}:{}", CACHE_NAMESPACE, self.sandbox_id, namespace_id)
    }

    pub fn durable_key(&self, namespace_id: &NamespaceId) -> String {
        format!("{}{}.json", self.durable_prefix(), namespace_id)
    }

    /// Storage prefix holding every durable record of this sandbox
    pub fn durable_prefix(&self) -> String {
        format!("{}/{}/", DURABLE_ROOT, self.sandbox_id)
    }

    /// Publish `record`: durable copy first, then the cache.
    ///
    /// A put older than the last one published for the same namespace is
    /// dropped. A cache failure after the durable write succeeded is logged
    /// and the stale cache entry is evicted so later reads go to durable
    /// storage.
    pub async fn put(&self, record: &MetadataRecord, timeout: Duration) -> Result<()> {
        record.validate()?;

        if let Some(last) = self.published.get(&record.namespace_id)
            && record.updated_at < *last
        {
            tracing::debug!(
                namespace_id = %record.namespace_id,
                "dropping metadata put older than the last published record"
            );
            return Ok(());
        }

        let json = serde_json::to_string(record)
            .map_err(|e| Error::corrupted(record.namespace_id.as_str(), e.to_string()))?;
        let ttl = record.remaining_ttl(Utc::now());

        with_deadline(
            "metadata.durable_put",
            timeout,
            self.durable
                .put(&self.durable_key(&record.namespace_id), json.clone().into_bytes()),
        )
        .await?;

        self.published
            .insert(record.namespace_id.clone(), record.updated_at);
        if self.published.len() > self.published_limit {
            self.trim_published(timeout);
        }

        let cache_key = self.cache_key(&record.namespace_id);
        if let Err(err) =
            with_deadline("metadata.cache_put", timeout, self.cache.put(&cache_key, json, ttl)).await
        {
            tracing::warn!(
                namespace_id = %record.namespace_id,
                error = %err,
                "cache write failed after durable write; evicting cached copy"
            );
            if let Err(err) =
                with_deadline("metadata.cache_delete", timeout, self.cache.delete(&cache_key)).await
            {
                tracing::error!(
                    namespace_id = %record.namespace_id,
                    error = %err,
                    "failed to evict cached metadata; reads may see the previous record until it expires"
                );
            }
        }

        Ok(())
    }

    /// Fetch the raw record, including expired and pending ones.
    ///
    /// Falls back to durable storage on a cache miss and repairs the cache
    /// when the record is still live.
    pub async fn fetch(
        &self,
        namespace_id: &NamespaceId,
        timeout: Duration,
    ) -> Result<Option<MetadataRecord>> {
        // Never a valid storage key, so never a stored namespace
        if namespace_id.as_str().is_empty() || namespace_id.as_str().contains(['/', '.']) {
            return Ok(None);
        }

        let cache_key = self.cache_key(namespace_id);

        match with_deadline("metadata.cache_get", timeout, self.cache.get(&cache_key)).await {
            Ok(Some(json)) => return self.parse(namespace_id, &json).map(Some),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    namespace_id = %namespace_id,
                    error = %err,
                    "cache lookup failed; falling back to durable metadata"
                );
            }
        }

        let durable_key = self.durable_key(namespace_id);
        let exists = with_deadline(
            "metadata.durable_exists",
            timeout,
            self.durable.exists(&durable_key),
        )
        .await?;
        if !exists {
            return Ok(None);
        }

        let raw = with_deadline("metadata.durable_get", timeout, self.durable.get(&durable_key))
            .await?;
        let json = String::from_utf8(raw)
            .map_err(|_| Error::corrupted(namespace_id.as_str(), "metadata is not UTF-8"))?;
        let record = self.parse(namespace_id, &json)?;

        let now = Utc::now();
        if !record.is_expired_at(now) {
            tracing::debug!(namespace_id = %namespace_id, "repairing cache from durable metadata");
            if let Err(err) = with_deadline(
                "metadata.cache_put",
                timeout,
                self.cache.put(&cache_key, json, record.remaining_ttl(now)),
            )
            .await
            {
                tracing::warn!(namespace_id = %namespace_id, error = %err, "cache repair failed");
            }
        }

        Ok(Some(record))
    }

    /// Live record or [`Error::NamespaceNotFound`].
    ///
    /// Expired records count as absent and their physical removal is
    /// scheduled in the background.
    pub async fn get(&self, namespace_id: &NamespaceId, timeout: Duration) -> Result<MetadataRecord> {
        match self.fetch(namespace_id, timeout).await? {
            Some(record) if record.is_expired() => {
                self.schedule_expiry(namespace_id.clone(), timeout);
                Err(Error::NamespaceNotFound(namespace_id.to_string()))
            }
            Some(record) => Ok(record),
            None => Err(Error::NamespaceNotFound(namespace_id.to_string())),
        }
    }

    /// Drop the cached copy only; the next read goes to durable storage
    pub async fn invalidate(&self, namespace_id: &NamespaceId, timeout: Duration) -> Result<()> {
        with_deadline(
            "metadata.cache_delete",
            timeout,
            self.cache.delete(&self.cache_key(namespace_id)),
        )
        .await?;
        Ok(())
    }

    /// Remove the record everywhere. Returns whether a durable copy existed.
    pub async fn remove(&self, namespace_id: &NamespaceId, timeout: Duration) -> Result<bool> {
        let existed = with_deadline(
            "metadata.durable_delete",
            timeout,
            self.durable.delete(&self.durable_key(namespace_id)),
        )
        .await?;
        self.invalidate(namespace_id, timeout).await?;
        self.published.remove(namespace_id);
        Ok(existed)
    }

    /// Best-effort background removal of an expired record
    pub fn schedule_expiry(&self, namespace_id: NamespaceId, timeout: Duration) {
        let gateway = self.clone();
        tokio::spawn(async move {
            // Re-check: the record may have been extended or replaced meanwhile
            match gateway.fetch(&namespace_id, timeout).await {
                Ok(Some(record)) if record.is_expired() => {
                    if let Err(err) = gateway.remove(&namespace_id, timeout).await {
                        tracing::warn!(
                            namespace_id = %namespace_id,
                            error = %err,
                            "failed to remove expired metadata; sweep will retry"
                        );
                    } else {
                        tracing::debug!(namespace_id = %namespace_id, "removed expired metadata");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(namespace_id = %namespace_id, error = %err, "expiry re-check failed");
                }
            }
        });
    }

    /// Every durable record in the sandbox, by brute-force scan.
    ///
    /// Records that fail validation are logged and skipped. Order is undefined.
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<MetadataRecord>> {
        let keys = with_deadline(
            "metadata.durable_list",
            timeout,
            self.durable.list(&self.durable_prefix()),
        )
        .await?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let raw = match with_deadline("metadata.durable_get", timeout, self.durable.get(&key))
                .await
            {
                Ok(raw) => raw,
                // Removed between list and get
                Err(Error::Provider(_)) => continue,
                Err(err) => return Err(err),
            };

            let parsed = String::from_utf8(raw)
                .map_err(|_| Error::corrupted(key.as_str(), "metadata is not UTF-8"))
                .and_then(|json| {
                    let id = key
                        .strip_prefix(&self.durable_prefix())
                        .and_then(|name| name.strip_suffix(".json"))
                        .unwrap_or(&key);
                    self.parse(&NamespaceId::from(id), &json)
                });

            match parsed {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(key = %key, error = %err, "skipping unreadable metadata"),
            }
        }

        Ok(records)
    }

    fn trim_published(&self, timeout: Duration) {
        let retention = chrono::Duration::from_std(timeout.saturating_mul(PUBLISHED_RETENTION_TIMEOUTS))
            .unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return;
        };
        let before = self.published.len();
        self.published.retain(|_, published_at| *published_at >= cutoff);
        tracing::debug!(
            trimmed = before.saturating_sub(self.published.len()),
            "trimmed last-write stamps"
        );
    }

    fn parse(&self, namespace_id: &NamespaceId, json: &str) -> Result<MetadataRecord> {
        let record: MetadataRecord = serde_json::from_str(json)
            .map_err(|e| Error::corrupted(namespace_id.as_str(), e.to_string()))?;
        record.validate()?;
        if &record.namespace_id != namespace_id {
            return Err(Error::corrupted(
                namespace_id.as_str(),
                format!("record belongs to '{}'", record.namespace_id),
            ));
        }
        Ok(record)
    }
}
