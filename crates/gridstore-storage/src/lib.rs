//! # gridstore storage providers
//!
//! Byte-level storage back-ends consumed by the namespace engine. Every
//! back-end implements [`StorageProvider`]; the engine never branches on
//! which one it was given.
//!
//! ## Back-ends
//!
//! - **In-memory**: [`InMemoryStorageProvider`], for tests and single-process use
//! - **File system**: [`FileSystemStorageProvider`], objects as files under a root directory

use gridstore_core::{Result, StoreConfig};
use std::sync::Arc;

mod filesystem;
mod memory;
mod presign;
mod provider;

pub use filesystem::FileSystemStorageProvider;
pub use memory::InMemoryStorageProvider;
pub use presign::{PresignedOperation, PresignedUrl};
pub use provider::StorageProvider;

/// Build the storage provider selected by `config.storage`
pub fn provider_from_config(config: &StoreConfig) -> anyhow::Result<Arc<dyn StorageProvider>> {
    match config.storage.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryStorageProvider::new())),
        "filesystem" => {
            let root = config
                .storage
                .root
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("storage.root is required for the filesystem provider"))?;
            Ok(Arc::new(FileSystemStorageProvider::new(root)))
        }
        other => Err(anyhow::anyhow!("unknown storage provider '{}'", other)),
    }
}

/// Reject keys that could escape a provider's key space
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(gridstore_core::Error::provider(format!(
            "invalid object key '{}'",
            key
        )));
    }
    Ok(())
}
