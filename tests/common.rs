//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use gridstore_cache::InMemoryMetadataCache;
use gridstore_core::{AccessContext, Error, NamespaceId, Result, ScopeOwner, StoreConfig};
use gridstore_namespace::{CreateNamespaceRequest, NamespaceStore};
use gridstore_storage::{InMemoryStorageProvider, StorageProvider};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Store over in-memory back-ends, with a handle on the storage provider
/// for inspecting objects and completing presigned uploads.
pub fn memory_store() -> (NamespaceStore, InMemoryStorageProvider) {
    let storage = InMemoryStorageProvider::new();
    let store = NamespaceStore::new(
        Arc::new(StoreConfig::test_defaults()),
        Arc::new(storage.clone()),
        Arc::new(InMemoryMetadataCache::new()),
    );
    (store, storage)
}

/// Create a text blob owned by `owner` and return its id
pub async fn text_blob(store: &NamespaceStore, owner: &ScopeOwner, text: &str) -> NamespaceId {
    store
        .create_namespace(
            CreateNamespaceRequest::blob(owner.clone(), "text/plain").with_data(text.as_bytes().to_vec()),
            &AccessContext::for_owner(owner),
        )
        .await
        .expect("create blob")
}

/// Store over `storage` with a fresh in-memory cache
pub fn store_over(storage: Arc<dyn StorageProvider>, config: StoreConfig) -> NamespaceStore {
    NamespaceStore::new(Arc::new(config), storage, Arc::new(InMemoryMetadataCache::new()))
}

#[derive(Default)]
struct Faults {
    fail_put: Option<String>,
    /// Marker and how many matching copies still succeed
    fail_copy: Option<(String, usize)>,
    slow_get: Option<(String, Duration)>,
    slow_put: Option<(String, Duration)>,
}

/// In-memory storage that fails or stalls calls on keys containing a marker
#[derive(Clone, Default)]
pub struct FaultyStorage {
    inner: InMemoryStorageProvider,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStorageProvider {
        &self.inner
    }

    pub fn fail_puts(&self, marker: &str) {
        self.faults.lock().unwrap().fail_put = Some(marker.to_string());
    }

    /// Let `successes` matching copies through, then fail the rest
    pub fn fail_copies_after(&self, marker: &str, successes: usize) {
        self.faults.lock().unwrap().fail_copy = Some((marker.to_string(), successes));
    }

    pub fn slow_gets(&self, marker: &str, delay: Duration) {
        self.faults.lock().unwrap().slow_get = Some((marker.to_string(), delay));
    }

    pub fn slow_puts(&self, marker: &str, delay: Duration) {
        self.faults.lock().unwrap().slow_put = Some((marker.to_string(), delay));
    }

    /// Back to normal behaviour
    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    fn delay(rule: &Option<(String, Duration)>, key: &str) -> Option<Duration> {
        rule.as_ref()
            .filter(|(marker, _)| key.contains(marker.as_str()))
            .map(|(_, delay)| *delay)
    }
}

#[async_trait]
impl StorageProvider for FaultyStorage {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        let (fail, delay) = {
            let faults = self.faults.lock().unwrap();
            let fail = faults
                .fail_put
                .as_deref()
                .is_some_and(|marker| key.contains(marker));
            (fail, Self::delay(&faults.slow_put, key))
        };
        if fail {
            return Err(Error::provider(format!("injected put failure: {}", key)));
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let delay = Self::delay(&self.faults.lock().unwrap().slow_get, key);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<String> {
        let fail = {
            let mut faults = self.faults.lock().unwrap();
            match &mut faults.fail_copy {
                Some((marker, _)) if !to.contains(marker.as_str()) => false,
                Some((_, 0)) => true,
                Some((_, remaining)) => {
                    *remaining -= 1;
                    false
                }
                None => false,
            }
        };
        if fail {
            return Err(Error::provider(format!("injected copy failure: {}", to)));
        }
        self.inner.copy(from, to).await
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String> {
        self.inner.presign_get(key, expires).await
    }

    async fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        self.inner.presign_put(key, expires).await
    }
}

/// Log lines captured by [`capture_logs`]
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route warnings and errors on this thread into a buffer until the guard drops
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
