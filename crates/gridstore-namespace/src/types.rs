//! Request and response types for the namespace engine

use chrono::{DateTime, Utc};
use gridstore_core::{
    Error, MetadataRecord, NamespaceContent, NamespaceId, NamespaceKind, Result, ScopeOwner,
    StoreConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default MIME type recorded for workspace namespaces
pub const WORKSPACE_MIME: &str = "inode/directory";

fn check_mime(mime: &str) -> Result<()> {
    if mime.trim().is_empty() {
        return Err(Error::validation("mime type must not be empty"));
    }
    Ok(())
}

fn check_payload(config: &StoreConfig, len: usize) -> Result<()> {
    if len as u64 > config.max_payload_bytes {
        return Err(Error::validation(format!(
            "payload of {} bytes exceeds the {} byte ceiling",
            len, config.max_payload_bytes
        )));
    }
    Ok(())
}

/// Request to create a namespace
#[derive(Debug, Clone)]
pub struct CreateNamespaceRequest {
    pub kind: NamespaceKind,
    pub owner: ScopeOwner,
    pub mime: String,
    pub filename: Option<String>,
    pub summary: String,
    pub tags: BTreeSet<String>,
    pub custom_meta: BTreeMap<String, String>,
    /// Time to live from creation; `None` never expires
    pub ttl: Option<Duration>,
    /// Initial blob payload. Blobs without one start out empty.
    pub data: Option<Vec<u8>>,
    /// Attribution recorded on session-scoped namespaces. Ownership stays
    /// with the session.
    pub user_id: Option<String>,
}

impl CreateNamespaceRequest {
    pub fn blob(owner: ScopeOwner, mime: impl Into<String>) -> Self {
        Self::new(NamespaceKind::Blob, owner, mime.into())
    }

    pub fn workspace(owner: ScopeOwner) -> Self {
        Self::new(NamespaceKind::Workspace, owner, WORKSPACE_MIME.to_string())
    }

    fn new(kind: NamespaceKind, owner: ScopeOwner, mime: String) -> Self {
        Self {
            kind,
            owner,
            mime,
            filename: None,
            summary: String::new(),
            tags: BTreeSet::new(),
            custom_meta: BTreeMap::new(),
            ttl: None,
            data: None,
            user_id: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_meta.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn validate(&self, config: &StoreConfig) -> Result<()> {
        self.owner.validate()?;
        check_mime(&self.mime)?;
        if let Some(data) = &self.data {
            if self.kind == NamespaceKind::Workspace {
                return Err(Error::validation(
                    "workspaces are created empty; write files after creation",
                ));
            }
            check_payload(config, data.len())?;
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::validation("ttl must be positive"));
        }
        Ok(())
    }
}

/// Content written by [`crate::NamespaceStore::write_namespace`]
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Workspace file path; must be `None` for blobs
    pub path: Option<String>,
    pub data: Vec<u8>,
    /// New MIME type. For blobs it replaces the namespace MIME type; for
    /// workspace files it is stored on the entry.
    pub mime: Option<String>,
}

impl WriteRequest {
    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: None,
            data: data.into(),
            mime: None,
        }
    }

    pub fn file(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: Some(path.into()),
            data: data.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn validate(&self, config: &StoreConfig) -> Result<()> {
        if let Some(mime) = &self.mime {
            check_mime(mime)?;
        }
        check_payload(config, self.data.len())
    }
}

/// Listing filter applied to an owner's namespaces
#[derive(Debug, Clone, Default)]
pub struct NamespaceFilter {
    pub kind: Option<NamespaceKind>,
    pub limit: Option<usize>,
}

impl NamespaceFilter {
    pub fn kind(kind: NamespaceKind) -> Self {
        Self {
            kind: Some(kind),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, record: &MetadataRecord) -> bool {
        self.kind.is_none_or(|kind| record.kind() == kind)
    }
}

/// Predicates for [`crate::NamespaceStore::search_namespaces`]; all must hold
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub mime_prefix: Option<String>,
    /// Every tag must be present
    pub tags: BTreeSet<String>,
    /// Every pair must match exactly
    pub custom_meta: BTreeMap<String, String>,
    pub filter: NamespaceFilter,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mime_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mime_prefix = Some(prefix.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_meta.insert(key.into(), value.into());
        self
    }

    pub fn with_filter(mut self, filter: NamespaceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub(crate) fn matches(&self, record: &MetadataRecord) -> bool {
        self.filter.matches(record)
            && self
                .mime_prefix
                .as_deref()
                .is_none_or(|prefix| record.mime.starts_with(prefix))
            && self.tags.is_subset(&record.tags)
            && self
                .custom_meta
                .iter()
                .all(|(k, v)| record.custom_meta.get(k) == Some(v))
    }
}

/// Partial metadata update. `None` leaves a field untouched; `custom_meta`
/// entries are merged into the existing map.
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub summary: Option<String>,
    pub filename: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub custom_meta: BTreeMap<String, String>,
}

impl MetadataUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_meta.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.filename.is_none()
            && self.tags.is_none()
            && self.custom_meta.is_empty()
    }
}

/// Options for [`crate::NamespaceStore::copy_namespace`]
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Must equal the source owner when set
    pub target_owner: Option<ScopeOwner>,
    /// Label of the copy; defaults to the source label
    pub filename: Option<String>,
}

/// Lifetime of a presigned download URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignDuration {
    Short,
    Medium,
    Long,
    Custom(Duration),
}

impl PresignDuration {
    pub fn resolve(self, config: &StoreConfig) -> Result<Duration> {
        let duration = match self {
            PresignDuration::Short => Duration::from_secs(config.presign.short_secs),
            PresignDuration::Medium => Duration::from_secs(config.presign.medium_secs),
            PresignDuration::Long => Duration::from_secs(config.presign.long_secs),
            PresignDuration::Custom(duration) => duration,
        };
        if duration.is_zero() {
            return Err(Error::validation("presign duration must be positive"));
        }
        Ok(duration)
    }
}

/// One immediate child of a workspace directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    /// Full path from the workspace root
    pub path: String,
    pub name: String,
    pub is_directory: bool,
    pub bytes: u64,
    pub checksum: Option<String>,
    pub mime: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Immutable snapshot of a namespace.
///
/// `content` carries the same shape as the namespace content, with object
/// keys pointing into the checkpoint area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub namespace_id: NamespaceId,
    /// Monotonic per namespace, starting at 1
    pub seq: u64,
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Namespace version the snapshot was taken from
    pub source_version: u64,
    pub mime: String,
    pub bytes: u64,
    pub checksum: String,
    pub content: NamespaceContent,
}

/// Request to checkpoint a namespace
#[derive(Debug, Clone, Default)]
pub struct CheckpointRequest {
    pub label: String,
}

impl CheckpointRequest {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Legacy single-object store request. Always session scoped.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub data: Vec<u8>,
    pub mime: String,
    pub summary: String,
    pub filename: Option<String>,
    pub custom_meta: BTreeMap<String, String>,
    /// Owning session; a fresh one is allocated when unset
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Falls back to the configured default TTL
    pub ttl: Option<Duration>,
}

impl StoreRequest {
    pub fn new(data: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
            summary: String::new(),
            filename: None,
            custom_meta: BTreeMap::new(),
            session_id: None,
            user_id: None,
            ttl: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_meta.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// One item of a batch store
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub data: Vec<u8>,
    pub mime: String,
    pub summary: String,
    pub filename: Option<String>,
    pub custom_meta: BTreeMap<String, String>,
}

impl BatchItem {
    pub fn new(data: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime: mime.into(),
            summary: String::new(),
            filename: None,
            custom_meta: BTreeMap::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Settings shared by every item of a batch
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub ttl: Option<Duration>,
}

/// Request for a direct-upload URL
#[derive(Debug, Clone)]
pub struct PresignUploadRequest {
    pub owner: ScopeOwner,
    pub filename: Option<String>,
    pub mime: String,
    /// Lifetime of both the URL and the pending record
    pub expires: Duration,
}

impl PresignUploadRequest {
    pub fn new(owner: ScopeOwner, mime: impl Into<String>, expires: Duration) -> Self {
        Self {
            owner,
            filename: None,
            mime: mime.into(),
            expires,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.owner.validate()?;
        check_mime(&self.mime)?;
        if self.expires.is_zero() {
            return Err(Error::validation("upload expiry must be positive"));
        }
        Ok(())
    }
}

/// Handle returned by [`crate::NamespaceStore::presign_upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    pub namespace_id: NamespaceId,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Finalization details for [`crate::NamespaceStore::register_uploaded`]
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    /// Replaces the MIME type given at presign time
    pub mime: Option<String>,
    pub summary: Option<String>,
    pub tags: BTreeSet<String>,
    pub custom_meta: BTreeMap<String, String>,
    /// Lifetime of the committed namespace; `None` never expires
    pub ttl: Option<Duration>,
}

impl RegisterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_meta.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(mime) = &self.mime {
            check_mime(mime)?;
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(Error::validation("ttl must be positive"));
        }
        Ok(())
    }
}

/// Handle returned by [`crate::NamespaceStore::initiate_multipart_upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub namespace_id: NamespaceId,
    pub upload_id: String,
    pub expires_at: DateTime<Utc>,
}

/// One part reported back on completion, with the checksum its upload returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedPart {
    pub part_number: u32,
    pub checksum: String,
}

impl UploadedPart {
    pub fn new(part_number: u32, checksum: impl Into<String>) -> Self {
        Self {
            part_number,
            checksum: checksum.into(),
        }
    }
}

/// Sandbox-wide figures from [`crate::NamespaceStore::get_stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub sandbox_id: String,
    pub storage_provider: String,
    pub cache_provider: String,
    /// Live, committed namespaces
    pub namespaces: usize,
    pub blobs: usize,
    pub workspaces: usize,
    /// Live namespaces per scope name
    pub by_scope: BTreeMap<String, usize>,
    /// Uploads presigned or initiated but not yet committed
    pub pending_uploads: usize,
    /// Records past their expiry that sweep has not removed yet
    pub expired: usize,
    /// Bytes referenced by live namespaces
    pub bytes: u64,
}

/// Storage figures of one namespace from [`crate::NamespaceStore::get_storage_stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub namespace_id: NamespaceId,
    pub kind: NamespaceKind,
    pub version: u64,
    pub total_files: usize,
    pub total_directories: usize,
    pub total_bytes: u64,
    pub checkpoints: usize,
}

/// Outcome of [`crate::NamespaceStore::sweep`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Committed namespaces past their expiry, removed entirely
    pub expired_namespaces: usize,
    /// Pending uploads never registered before expiry
    pub expired_uploads: usize,
    /// Data objects belonging to no metadata record
    pub orphaned_objects: usize,
    /// Data objects replaced by a later version
    pub superseded_objects: usize,
    /// Checkpoint objects of removed namespaces or unfinished checkpoints
    pub orphaned_checkpoint_objects: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.expired_namespaces
            + self.expired_uploads
            + self.orphaned_objects
            + self.superseded_objects
            + self.orphaned_checkpoint_objects
    }
}
