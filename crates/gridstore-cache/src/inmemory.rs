//! In-process metadata cache

use crate::MetadataCache;
use async_trait::async_trait;
use dashmap::DashMap;
use gridstore_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

/// In-process cache back-end.
///
/// Suitable for tests and single-process deployments. Expired entries are
/// dropped when next touched. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemoryMetadataCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including not-yet-reaped expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, as a cache restart would
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));

        match value {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| !entry.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}
