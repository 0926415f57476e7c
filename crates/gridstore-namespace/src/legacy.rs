//! Legacy single-object surface
//!
//! `store`, `retrieve`, `metadata` and `delete` predate namespaces. Each maps
//! onto the session-scoped Blob operation of the same meaning, so both
//! surfaces observe the same records.

use crate::NamespaceStore;
use crate::types::{CreateNamespaceRequest, StoreRequest};
use gridstore_core::{AccessContext, MetadataRecord, NamespaceId, Result, ScopeOwner};
use uuid::Uuid;

/// Where a legacy `store` put its object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    pub namespace_id: NamespaceId,
    /// Owning session; the one passed in or a freshly allocated one
    pub session_id: String,
}

impl StoreReceipt {
    /// Context owning the stored object
    pub fn context(&self) -> AccessContext {
        AccessContext::session(self.session_id.clone())
    }
}

/// Fresh session id for callers that did not bring one
pub fn allocate_session_id() -> String {
    format!("sess-{}", Uuid::new_v4().simple())
}

impl NamespaceStore {
    /// Store one object in a session-scoped Blob namespace.
    ///
    /// Expires after the configured default TTL unless the request sets one.
    pub async fn store(&self, req: StoreRequest) -> Result<StoreReceipt> {
        let session_id = req.session_id.unwrap_or_else(allocate_session_id);
        let owner = ScopeOwner::session(session_id.clone());
        let ctx = AccessContext::for_owner(&owner);

        let mut create = CreateNamespaceRequest::blob(owner, req.mime)
            .with_data(req.data)
            .with_summary(req.summary)
            .with_ttl(req.ttl.unwrap_or_else(|| self.config.default_ttl()));
        create.filename = req.filename;
        create.custom_meta = req.custom_meta;
        create.user_id = req.user_id;

        let namespace_id = self.create_namespace(create, &ctx).await?;
        Ok(StoreReceipt {
            namespace_id,
            session_id,
        })
    }

    /// Bytes of a blob namespace
    pub async fn retrieve(&self, namespace_id: &NamespaceId, ctx: &AccessContext) -> Result<Vec<u8>> {
        self.read_namespace(namespace_id, None, ctx).await
    }

    pub async fn metadata(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        self.get_metadata(namespace_id, ctx).await
    }

    pub async fn delete(&self, namespace_id: &NamespaceId, ctx: &AccessContext) -> Result<bool> {
        self.delete_namespace(namespace_id, ctx).await
    }
}
