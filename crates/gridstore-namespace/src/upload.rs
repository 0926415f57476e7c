//! Presign, upload, register
//!
//! `presign_upload` publishes a pending record that reads treat as absent and
//! hands out a direct-upload URL. `register_uploaded` checks the bytes landed
//! and commits the record. An upload that is never registered expires with
//! its pending record and sweep reclaims the bytes.

use crate::NamespaceStore;
use crate::keys;
use crate::types::{PresignUploadRequest, PresignedUpload, RegisterRequest};
use chrono::Utc;
use gridstore_core::record::to_chrono;
use gridstore_core::{
    AccessContext, Error, MetadataRecord, NamespaceContent, NamespaceId, NamespaceKind, Operation,
    RecordStatus, Result, StoredObject, check_access, sha256_hex, with_deadline,
};
use std::time::Duration;
use tracing::Instrument;

impl NamespaceStore {
    /// Reserve a blob namespace and return a URL to upload its bytes to
    pub async fn presign_upload(
        &self,
        req: PresignUploadRequest,
        ctx: &AccessContext,
    ) -> Result<PresignedUpload> {
        let span = self.span("presign_upload", None);
        async move {
            req.validate()?;
            check_access(Operation::Write, &req.owner, ctx)?;
            let timeout = self.timeout(ctx);

            let namespace_id = NamespaceId::generate();
            let _guard = self.locks.acquire(&namespace_id, timeout).await?;

            let mut record = MetadataRecord::new(
                namespace_id.clone(),
                self.config.sandbox_id.clone(),
                &req.owner,
                NamespaceKind::Blob,
                req.mime,
            );
            let upload_key = keys::version_key(&record, 1, None)?;
            let expires_at = Utc::now() + to_chrono(req.expires)?;
            record.filename = req.filename;
            record.status = RecordStatus::Pending;
            record.upload_key = Some(upload_key.clone());
            record.expires_at = Some(expires_at);

            let upload_url = with_deadline(
                "storage.presign_put",
                timeout,
                self.storage.presign_put(&upload_key, req.expires),
            )
            .await?;
            // The URL is only handed out once the pending record exists
            self.gateway.put(&record, timeout).await?;

            tracing::debug!(namespace_id = %namespace_id, %expires_at, "upload presigned");
            Ok(PresignedUpload {
                namespace_id,
                upload_url,
                expires_at,
            })
        }
        .instrument(span)
        .await
    }

    /// Commit a pending upload once its bytes are in storage
    pub async fn register_uploaded(
        &self,
        namespace_id: &NamespaceId,
        req: RegisterRequest,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let span = self.span("register_uploaded", Some(namespace_id));
        async move {
            req.validate()?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load_pending(namespace_id, ctx, timeout).await?;

            if record.multipart_upload_id.is_some() {
                return Err(Error::validation(format!(
                    "namespace '{}' is a multipart upload; complete it instead",
                    namespace_id
                )));
            }
            let upload_key = record
                .upload_key
                .clone()
                .ok_or_else(|| Error::corrupted(namespace_id.as_str(), "pending record without an upload key"))?;
            if !with_deadline("storage.exists", timeout, self.storage.exists(&upload_key)).await? {
                return Err(Error::validation(format!(
                    "nothing has been uploaded for namespace '{}'",
                    namespace_id
                )));
            }

            let data = with_deadline("storage.get", timeout, self.storage.get(&upload_key)).await?;
            if data.len() as u64 > self.config.max_payload_bytes {
                return Err(Error::validation(format!(
                    "uploaded payload of {} bytes exceeds the {} byte ceiling",
                    data.len(),
                    self.config.max_payload_bytes
                )));
            }

            let object = StoredObject {
                key: upload_key,
                bytes: data.len() as u64,
                checksum: sha256_hex(&data),
                mime: None,
                modified_at: Utc::now(),
            };
            finish_registration(&mut record, object, req)?;

            // Publishing is the commit; a failure leaves the upload pending
            self.gateway.put(&record, timeout).await?;
            tracing::debug!(namespace_id = %namespace_id, bytes = record.bytes, "upload registered");
            Ok(record)
        }
        .instrument(span)
        .await
    }
}

impl NamespaceStore {
    /// Fetch a pending record and authorize a write on it
    pub(crate) async fn load_pending(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
        timeout: Duration,
    ) -> Result<MetadataRecord> {
        let record = self
            .gateway
            .fetch(namespace_id, timeout)
            .await?
            .ok_or_else(|| Error::NamespaceNotFound(namespace_id.to_string()))?;
        check_access(Operation::Write, &record.owner()?, ctx)?;

        if record.is_committed() {
            return Err(Error::validation(format!(
                "namespace '{}' is already registered",
                namespace_id
            )));
        }
        if record.is_expired() {
            self.gateway.schedule_expiry(namespace_id.clone(), timeout);
            return Err(Error::Expired(namespace_id.to_string()));
        }
        Ok(record)
    }
}

/// Turn a pending record into committed version 1 holding `object`
pub(crate) fn finish_registration(
    record: &mut MetadataRecord,
    object: StoredObject,
    req: RegisterRequest,
) -> Result<()> {
    let RegisterRequest {
        mime,
        summary,
        tags,
        custom_meta,
        ttl,
    } = req;
    record.content = NamespaceContent::Blob {
        object: Some(object),
    };
    if let Some(mime) = mime {
        record.mime = mime;
    }
    if let Some(summary) = summary {
        record.summary = summary;
    }
    record.tags.extend(tags);
    record.custom_meta.extend(custom_meta);
    record.status = RecordStatus::Committed;
    record.upload_key = None;
    record.multipart_upload_id = None;
    record.version = 1;
    record.updated_at = Utc::now();
    record.set_ttl(ttl)?;
    record.refresh_aggregates();
    Ok(())
}
