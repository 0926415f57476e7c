//! Core types for gridstore
//!
//! This crate holds everything the coordination layer shares across back-ends:
//! the error taxonomy, configuration, scope and ownership types, the grid
//! addressing codec, the access-control decision table and the persisted
//! metadata record shape. Nothing in here performs storage or cache I/O.

pub mod access;
pub mod checksum;
pub mod config;
pub mod deadline;
pub mod error;
pub mod grid;
pub mod record;
pub mod scope;

// Re-exports
pub use access::{AccessContext, Operation, check_access};
pub use checksum::{aggregate_checksum, sha256_hex};
pub use config::{CacheConfig, PresignConfig, StorageConfig, StoreConfig};
pub use deadline::with_deadline;
pub use error::{Error, Result};
pub use grid::{GridAddress, decode, encode, normalize_subpath};
pub use record::{
    MetadataRecord, NamespaceContent, NamespaceKind, RecordStatus, StoredObject, WorkspaceEntry,
};
pub use scope::{NamespaceId, Scope, ScopeOwner};
