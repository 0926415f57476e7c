//! Persisted metadata record and namespace content model

use crate::checksum::{aggregate_checksum, sha256_hex};
use crate::error::{Error, Result};
use crate::grid::{self, GridAddress};
use crate::scope::{NamespaceId, Scope, ScopeOwner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// The two namespace shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Exactly one payload
    Blob,
    /// A tree of files and directories
    Workspace,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Blob => "blob",
            NamespaceKind::Workspace => "workspace",
        }
    }
}

/// Commit state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Created by a presigned upload; not readable until registered
    Pending,
    #[default]
    Committed,
}

/// An immutable object in the storage provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub bytes: u64,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    pub modified_at: DateTime<Utc>,
}

/// One node of a workspace tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkspaceEntry {
    File { object: StoredObject },
    Directory { created_at: DateTime<Utc> },
}

impl WorkspaceEntry {
    pub fn object(&self) -> Option<&StoredObject> {
        match self {
            Self::File { object } => Some(object),
            Self::Directory { .. } => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

/// Current content of a namespace, keyed by normalized entry path for workspaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NamespaceContent {
    Blob {
        #[serde(default)]
        object: Option<StoredObject>,
    },
    Workspace {
        #[serde(default)]
        entries: BTreeMap<String, WorkspaceEntry>,
    },
}

impl NamespaceContent {
    pub fn empty(kind: NamespaceKind) -> Self {
        match kind {
            NamespaceKind::Blob => Self::Blob { object: None },
            NamespaceKind::Workspace => Self::Workspace {
                entries: BTreeMap::new(),
            },
        }
    }

    pub fn kind(&self) -> NamespaceKind {
        match self {
            Self::Blob { .. } => NamespaceKind::Blob,
            Self::Workspace { .. } => NamespaceKind::Workspace,
        }
    }

    /// Every storage key this content points at
    pub fn object_keys(&self) -> Vec<&str> {
        match self {
            Self::Blob { object } => object.iter().map(|o| o.key.as_str()).collect(),
            Self::Workspace { entries } => entries
                .values()
                .filter_map(WorkspaceEntry::object)
                .map(|o| o.key.as_str())
                .collect(),
        }
    }
}

/// One metadata record per namespace.
///
/// The serialized field set is the stable wire shape shared with other
/// processes using the same cache and storage back-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub namespace_id: NamespaceId,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub sandbox_id: String,
    pub mime: String,
    pub bytes: u64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub custom_meta: BTreeMap<String, String>,
    #[serde(default)]
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
    /// Target key of a pending presigned upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_key: Option<String>,
    /// Id of a pending multipart upload; its parts live under the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart_upload_id: Option<String>,
    /// Highest checkpoint sequence number ever handed out
    #[serde(default)]
    pub checkpoint_seq: u64,
    pub content: NamespaceContent,
}

impl MetadataRecord {
    /// Fresh, committed, empty record at version 0
    pub fn new(
        namespace_id: NamespaceId,
        sandbox_id: impl Into<String>,
        owner: &ScopeOwner,
        kind: NamespaceKind,
        mime: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut record = Self {
            namespace_id,
            scope: owner.scope(),
            session_id: owner.session_id().map(str::to_string),
            user_id: owner.user_id().map(str::to_string),
            sandbox_id: sandbox_id.into(),
            mime: mime.into(),
            bytes: 0,
            summary: String::new(),
            tags: BTreeSet::new(),
            custom_meta: BTreeMap::new(),
            checksum: String::new(),
            created_at: now,
            updated_at: now,
            expires_at: None,
            version: 0,
            filename: None,
            status: RecordStatus::Committed,
            upload_key: None,
            multipart_upload_id: None,
            checkpoint_seq: 0,
            content: NamespaceContent::empty(kind),
        };
        record.refresh_aggregates();
        record
    }

    /// Owner derived from `scope` and the populated owner fields.
    ///
    /// Fails with [`Error::CorruptedMetadata`] when they disagree.
    pub fn owner(&self) -> Result<ScopeOwner> {
        let missing = |field: &str| {
            Error::corrupted(
                self.namespace_id.as_str(),
                format!("{} scope without {}", self.scope, field),
            )
        };
        match self.scope {
            Scope::Session => self
                .session_id
                .clone()
                .filter(|id| !id.is_empty())
                .map(ScopeOwner::Session)
                .ok_or_else(|| missing("session_id")),
            Scope::User => self
                .user_id
                .clone()
                .filter(|id| !id.is_empty())
                .map(ScopeOwner::User)
                .ok_or_else(|| missing("user_id")),
            Scope::Sandbox => Ok(ScopeOwner::Sandbox),
        }
    }

    /// Schema checks applied to every record read back from a back-end
    pub fn validate(&self) -> Result<()> {
        if self.namespace_id.as_str().is_empty() {
            return Err(Error::corrupted("", "empty namespace_id"));
        }
        if self.sandbox_id.is_empty() {
            return Err(Error::corrupted(self.namespace_id.as_str(), "empty sandbox_id"));
        }
        self.owner()?;
        if self.status == RecordStatus::Pending
            && self.upload_key.is_none()
            && self.multipart_upload_id.is_none()
        {
            return Err(Error::corrupted(
                self.namespace_id.as_str(),
                "pending record without an upload key",
            ));
        }
        Ok(())
    }

    pub fn kind(&self) -> NamespaceKind {
        self.content.kind()
    }

    pub fn is_committed(&self) -> bool {
        self.status == RecordStatus::Committed
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry; `None` when the record never expires
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| (expires_at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Set `expires_at` to `now + ttl`, or clear it
    pub fn set_ttl(&mut self, ttl: Option<Duration>) -> Result<()> {
        self.expires_at = match ttl {
            Some(ttl) => Some(Utc::now() + to_chrono(ttl)?),
            None => None,
        };
        Ok(())
    }

    pub fn grid_address(&self) -> Result<GridAddress> {
        Ok(GridAddress::new(
            self.sandbox_id.clone(),
            self.owner()?,
            self.namespace_id.clone(),
        ))
    }

    /// Canonical grid path of the namespace root
    pub fn grid_path(&self) -> Result<String> {
        grid::encode(
            &self.sandbox_id,
            &self.owner()?,
            &self.namespace_id,
            None,
        )
    }

    /// Storage keys that must survive a sweep
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys = self.content.object_keys();
        if let Some(upload_key) = &self.upload_key {
            keys.push(upload_key);
        }
        keys
    }

    /// Recompute `bytes` and `checksum` from the content
    pub fn refresh_aggregates(&mut self) {
        match &self.content {
            NamespaceContent::Blob { object } => {
                self.bytes = object.as_ref().map_or(0, |o| o.bytes);
                self.checksum = object
                    .as_ref()
                    .map_or_else(|| sha256_hex(b""), |o| o.checksum.clone());
            }
            NamespaceContent::Workspace { entries } => {
                let files = entries
                    .iter()
                    .filter_map(|(path, entry)| entry.object().map(|o| (path.as_str(), o)));
                self.bytes = files.clone().map(|(_, o)| o.bytes).sum();
                self.checksum =
                    aggregate_checksum(files.map(|(path, o)| (path, o.checksum.as_str())));
            }
        }
    }
}

/// Convert a std duration to a chrono one, rejecting absurd values
pub fn to_chrono(duration: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|_| Error::validation(format!("duration {:?} is out of range", duration)))
}
