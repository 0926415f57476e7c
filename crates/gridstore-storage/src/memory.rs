//! In-memory storage provider

use crate::presign::{PresignedOperation, PresignedUrl};
use crate::{StorageProvider, validate_key};
use async_trait::async_trait;
use chrono::Utc;
use gridstore_core::{Error, Result, sha256_hex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const URL_SCHEME: &str = "memory";

/// In-memory storage provider.
///
/// This is primarily for testing and demonstration purposes.
/// Data is stored in memory and is not persisted across restarts. Clones
/// share the same object map.
#[derive(Clone)]
pub struct InMemoryStorageProvider {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    instance: String,
    secret: String,
}

impl InMemoryStorageProvider {
    /// Create a new, empty in-memory provider
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            instance: Uuid::new_v4().simple().to_string(),
            secret: Uuid::new_v4().to_string(),
        }
    }

    /// Complete a client-direct upload against a URL from [`StorageProvider::presign_put`].
    ///
    /// Stands in for the HTTP PUT an object store would accept.
    pub async fn accept_upload(&self, url: &str, data: Vec<u8>) -> Result<String> {
        let key = self.verified_key(url, PresignedOperation::Put)?;
        self.put(&key, data).await
    }

    /// Resolve a URL from [`StorageProvider::presign_get`] to its bytes
    pub async fn fetch_presigned(&self, url: &str) -> Result<Vec<u8>> {
        let key = self.verified_key(url, PresignedOperation::Get)?;
        self.get(&key).await
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn verified_key(&self, url: &str, operation: PresignedOperation) -> Result<String> {
        let parsed = PresignedUrl::parse(url)?;
        if parsed.scheme != URL_SCHEME || parsed.authority != self.instance {
            return Err(Error::provider("presigned URL belongs to another provider"));
        }
        parsed.verify(&self.secret, operation, Utc::now())?;
        Ok(parsed.key)
    }

    fn presign(&self, operation: PresignedOperation, key: &str, expires: Duration) -> Result<String> {
        validate_key(key)?;
        Ok(PresignedUrl::sign(URL_SCHEME, &self.instance, &self.secret, operation, key, expires)?
            .to_url())
    }
}

impl Default for InMemoryStorageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        validate_key(key)?;
        let checksum = sha256_hex(&data);
        self.objects.write().await.insert(key.to_string(), data);
        Ok(checksum)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::provider(format!("object not found: {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.objects.write().await.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String> {
        if !self.exists(key).await? {
            return Err(Error::provider(format!("object not found: {}", key)));
        }
        self.presign(PresignedOperation::Get, key, expires)
    }

    async fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        self.presign(PresignedOperation::Put, key, expires)
    }
}
