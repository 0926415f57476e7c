//! # gridstore namespaces
//!
//! The namespace engine: Blob and Workspace namespaces over a pluggable
//! [`gridstore_storage::StorageProvider`] and a cached metadata record per
//! namespace.
//!
//! ## Features
//!
//! - **Scoped access**: every call is authorized against the session, user or
//!   sandbox owning the namespace
//! - **Checkpoints**: immutable full snapshots with idempotent restore
//! - **Two-phase uploads**: presign, upload directly, then register; large
//!   payloads in numbered parts through a multipart upload
//! - **Batch store**: per-item results, one failure never aborts the rest
//! - **Legacy surface**: `store`, `retrieve`, `metadata`, `delete`
//! - **Sweep**: reclaims expired records and unreferenced objects
//! - **Stats**: sandbox-wide counts and per-namespace storage figures
//!
//! Mutations on one namespace id are serialized; reads never wait on them and
//! only ever observe published metadata.

mod batch;
mod checkpoint;
mod keys;
mod legacy;
mod locks;
mod multipart;
mod stats;
mod store;
mod sweep;
mod tree;
mod types;
mod upload;

pub use batch::BatchResult;
pub use legacy::{StoreReceipt, allocate_session_id};
pub use locks::{NamespaceGuard, NamespaceLocks};
pub use multipart::MAX_PART_NUMBER;
pub use store::NamespaceStore;
pub use types::*;
