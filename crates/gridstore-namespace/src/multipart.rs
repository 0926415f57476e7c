//! Multipart uploads
//!
//! Large payloads arrive as numbered parts, each uploaded straight to storage
//! through its own presigned URL. Completion checks every reported part
//! against what landed, assembles them into the version 1 blob object and
//! commits the pending record. Parts live under the namespace's data prefix,
//! so an abandoned upload is reclaimed with its expired record.

use crate::NamespaceStore;
use crate::keys;
use crate::types::{MultipartUpload, PresignUploadRequest, RegisterRequest, UploadedPart};
use crate::upload::finish_registration;
use chrono::Utc;
use gridstore_core::record::to_chrono;
use gridstore_core::{
    AccessContext, Error, MetadataRecord, NamespaceId, NamespaceKind, Operation, RecordStatus,
    Result, StoredObject, check_access, sha256_hex, with_deadline,
};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Highest part number a client may upload
pub const MAX_PART_NUMBER: u32 = 10_000;

fn upload_not_found(namespace_id: &NamespaceId, upload_id: &str) -> Error {
    Error::NamespaceNotFound(format!("{}@{}", namespace_id, upload_id))
}

fn check_upload_id(record: &MetadataRecord, upload_id: &str) -> Result<()> {
    match &record.multipart_upload_id {
        Some(current) if current == upload_id => Ok(()),
        _ => Err(upload_not_found(&record.namespace_id, upload_id)),
    }
}

fn check_part_number(part_number: u32) -> Result<()> {
    if part_number == 0 || part_number > MAX_PART_NUMBER {
        return Err(Error::validation(format!(
            "part number {} is outside 1..={}",
            part_number, MAX_PART_NUMBER
        )));
    }
    Ok(())
}

impl NamespaceStore {
    /// Reserve a blob namespace to be filled by a multipart upload
    pub async fn initiate_multipart_upload(
        &self,
        req: PresignUploadRequest,
        ctx: &AccessContext,
    ) -> Result<MultipartUpload> {
        let span = self.span("initiate_multipart_upload", None);
        async move {
            req.validate()?;
            check_access(Operation::Write, &req.owner, ctx)?;
            let timeout = self.timeout(ctx);

            let namespace_id = NamespaceId::generate();
            let _guard = self.locks.acquire(&namespace_id, timeout).await?;

            let upload_id = format!("mpu-{}", Uuid::new_v4().simple());
            let expires_at = Utc::now() + to_chrono(req.expires)?;
            let mut record = MetadataRecord::new(
                namespace_id.clone(),
                self.config.sandbox_id.clone(),
                &req.owner,
                NamespaceKind::Blob,
                req.mime,
            );
            record.filename = req.filename;
            record.status = RecordStatus::Pending;
            record.multipart_upload_id = Some(upload_id.clone());
            record.expires_at = Some(expires_at);
            self.gateway.put(&record, timeout).await?;

            tracing::debug!(namespace_id = %namespace_id, upload_id = %upload_id, "multipart upload initiated");
            Ok(MultipartUpload {
                namespace_id,
                upload_id,
                expires_at,
            })
        }
        .instrument(span)
        .await
    }

    /// Presigned URL for uploading one part. Re-uploading a part replaces it.
    pub async fn get_part_upload_url(
        &self,
        namespace_id: &NamespaceId,
        upload_id: &str,
        part_number: u32,
        expires: Duration,
        ctx: &AccessContext,
    ) -> Result<String> {
        let span = self.span("get_part_upload_url", Some(namespace_id));
        async move {
            check_part_number(part_number)?;
            if expires.is_zero() {
                return Err(Error::validation("URL expiry must be positive"));
            }
            let timeout = self.timeout(ctx);
            let record = self.load_pending(namespace_id, ctx, timeout).await?;
            check_upload_id(&record, upload_id)?;

            let key = keys::multipart_part_key(&record, upload_id, part_number)?;
            with_deadline("storage.presign_put", timeout, self.storage.presign_put(&key, expires))
                .await
        }
        .instrument(span)
        .await
    }

    /// Assemble the reported parts in part-number order and commit the namespace.
    ///
    /// Every part must have landed with the checksum its upload returned.
    pub async fn complete_multipart_upload(
        &self,
        namespace_id: &NamespaceId,
        upload_id: &str,
        mut parts: Vec<UploadedPart>,
        req: RegisterRequest,
        ctx: &AccessContext,
    ) -> Result<MetadataRecord> {
        let span = self.span("complete_multipart_upload", Some(namespace_id));
        async move {
            req.validate()?;
            if parts.is_empty() {
                return Err(Error::validation("a multipart upload needs at least one part"));
            }
            parts.sort_by_key(|part| part.part_number);
            for pair in parts.windows(2) {
                if pair[0].part_number == pair[1].part_number {
                    return Err(Error::validation(format!(
                        "part {} is listed twice",
                        pair[0].part_number
                    )));
                }
            }

            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load_pending(namespace_id, ctx, timeout).await?;
            check_upload_id(&record, upload_id)?;

            let mut assembled = Vec::new();
            for part in &parts {
                check_part_number(part.part_number)?;
                let key = keys::multipart_part_key(&record, upload_id, part.part_number)?;
                if !with_deadline("storage.exists", timeout, self.storage.exists(&key)).await? {
                    return Err(Error::validation(format!(
                        "part {} has not been uploaded",
                        part.part_number
                    )));
                }
                let data = with_deadline("storage.get", timeout, self.storage.get(&key)).await?;
                if sha256_hex(&data) != part.checksum {
                    return Err(Error::validation(format!(
                        "part {} does not match its reported checksum",
                        part.part_number
                    )));
                }
                if (assembled.len() + data.len()) as u64 > self.config.max_payload_bytes {
                    return Err(Error::validation(format!(
                        "assembled upload exceeds the {} byte ceiling",
                        self.config.max_payload_bytes
                    )));
                }
                assembled.extend_from_slice(&data);
            }

            let key = keys::version_key(&record, 1, None)?;
            let object: StoredObject = self.store_object(key, assembled, None, timeout).await?;
            finish_registration(&mut record, object, req)?;

            // Publishing is the commit; a failure leaves the upload pending
            self.gateway.put(&record, timeout).await?;

            let parts_prefix = keys::multipart_prefix(&record, upload_id)?;
            if let Err(err) = self.delete_prefix(&parts_prefix, timeout).await {
                tracing::warn!(
                    namespace_id = %namespace_id,
                    error = %err,
                    "failed to delete assembled parts; sweep will reclaim them"
                );
            }
            tracing::debug!(
                namespace_id = %namespace_id,
                parts = parts.len(),
                bytes = record.bytes,
                "multipart upload completed"
            );
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Drop a multipart upload with every part uploaded so far.
    ///
    /// Returns false when there is no such pending upload.
    pub async fn abort_multipart_upload(
        &self,
        namespace_id: &NamespaceId,
        upload_id: &str,
        ctx: &AccessContext,
    ) -> Result<bool> {
        let span = self.span("abort_multipart_upload", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;

            let Some(record) = self.gateway.fetch(namespace_id, timeout).await? else {
                return Ok(false);
            };
            check_access(Operation::Write, &record.owner()?, ctx)?;
            if record.is_committed() || record.multipart_upload_id.as_deref() != Some(upload_id) {
                return Ok(false);
            }

            let removed = self.purge(&record, timeout).await?;
            tracing::debug!(namespace_id = %namespace_id, upload_id, objects = removed, "multipart upload aborted");
            Ok(true)
        }
        .instrument(span)
        .await
    }
}
