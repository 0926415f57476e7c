//! Storage provider capability trait

use async_trait::async_trait;
use gridstore_core::Result;
use std::time::Duration;

/// Byte storage contract every back-end implements.
///
/// Keys are `/`-separated relative paths. Failures surface as
/// [`gridstore_core::Error::Provider`]; the namespace engine adds deadlines.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short back-end name used in logs
    fn name(&self) -> &str;

    /// Store `data` under `key`, replacing any existing object. Returns the
    /// hex SHA-256 checksum of the stored bytes.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String>;

    /// Fetch the object stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object. Returns false when nothing was stored under `key`.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Copy an object, returning the checksum of the copy
    async fn copy(&self, from: &str, to: &str) -> Result<String> {
        let data = self.get(from).await?;
        self.put(to, data).await
    }

    /// Time-limited URL for downloading `key` directly from the back-end
    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String>;

    /// Time-limited URL for uploading to `key` directly
    async fn presign_put(&self, key: &str, expires: Duration) -> Result<String>;
}
