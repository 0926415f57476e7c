//! Metadata cache capability trait

use async_trait::async_trait;
use gridstore_core::Result;
use std::time::Duration;

/// Key-value back-end holding serialized metadata records.
///
/// Implementations may drop entries at any time; the gateway treats every
/// miss as "ask durable storage".
#[async_trait]
pub trait MetadataCache: Send + Sync {
    fn name(&self) -> &str;

    /// Store `value`; when `ttl` is given the entry disappears after it elapses
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, key: &str) -> Result<bool>;
}
