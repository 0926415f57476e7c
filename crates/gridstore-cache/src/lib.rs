//! # gridstore metadata cache
//!
//! Metadata records live in two places: a durable JSON copy in the storage
//! provider and a fast copy in a [`MetadataCache`] back-end that may evict
//! or expire entries on its own. [`MetadataGateway`] hides that split and
//! presents records as if they were durable and immediately consistent.
//!
//! ## Guarantees
//!
//! - **Write-through**: durable copy first, then the cache
//! - **Lazy TTL**: the expiry timestamp travels inside the record, so a
//!   record rebuilt from durable storage after a cache miss is still
//!   treated as absent once past its expiry
//! - **Read-repair**: a cache miss served from durable storage re-populates
//!   the cache with the remaining TTL
//! - **Last-write-wins**: a put older than the last one this gateway
//!   published for the same namespace is dropped

use gridstore_core::StoreConfig;
use std::sync::Arc;

mod cache;
mod gateway;
mod inmemory;

pub use cache::MetadataCache;
pub use gateway::MetadataGateway;
pub use inmemory::InMemoryMetadataCache;

/// Build the cache back-end selected by `config.cache`
pub fn cache_from_config(config: &StoreConfig) -> anyhow::Result<Arc<dyn MetadataCache>> {
    match config.cache.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryMetadataCache::new())),
        other => Err(anyhow::anyhow!("unknown cache provider '{}'", other)),
    }
}
