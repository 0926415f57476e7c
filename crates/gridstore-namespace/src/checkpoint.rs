//! Checkpoint and restore
//!
//! A checkpoint is a full copy of a namespace's objects into the checkpoint
//! area plus a JSON manifest. The manifest is written last, so a checkpoint
//! that failed mid-copy is invisible and its objects are left for sweep.

use crate::NamespaceStore;
use crate::keys;
use crate::types::{Checkpoint, CheckpointRequest};
use chrono::Utc;
use gridstore_core::{AccessContext, Error, NamespaceId, Operation, Result, with_deadline};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

fn validate_checkpoint_id(checkpoint_id: &str) -> Result<()> {
    if checkpoint_id.is_empty() || checkpoint_id.contains('/') || checkpoint_id.starts_with('.') {
        return Err(Error::validation(format!(
            "invalid checkpoint id '{}'",
            checkpoint_id
        )));
    }
    Ok(())
}

fn checkpoint_not_found(namespace_id: &NamespaceId, checkpoint_id: &str) -> Error {
    Error::NamespaceNotFound(format!("{}@{}", namespace_id, checkpoint_id))
}

impl NamespaceStore {
    /// Snapshot the current state of a namespace.
    ///
    /// Holds the namespace lock for the whole copy, so the snapshot matches
    /// a state that actually existed. Requires write access.
    pub async fn checkpoint_namespace(
        &self,
        namespace_id: &NamespaceId,
        req: CheckpointRequest,
        ctx: &AccessContext,
    ) -> Result<Checkpoint> {
        let span = self.span("checkpoint", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            // Numbers of deleted checkpoints are never handed out again
            let listed = self
                .read_checkpoints(namespace_id, timeout)
                .await?
                .last()
                .map_or(0, |latest| latest.seq);
            let seq = record.checkpoint_seq.max(listed) + 1;
            let checkpoint_id = format!(
                "cp{:06}-{}",
                seq,
                &Uuid::new_v4().simple().to_string()[..8]
            );
            let label = if req.label.trim().is_empty() {
                format!("checkpoint {}", seq)
            } else {
                req.label
            };

            let sandbox_id = self.config.sandbox_id.as_str();
            let content = self
                .relocate(
                    &record.content,
                    |entry| {
                        Ok(keys::checkpoint_data_key(
                            sandbox_id,
                            namespace_id,
                            &checkpoint_id,
                            entry,
                        ))
                    },
                    timeout,
                )
                .await?;

            let checkpoint = Checkpoint {
                checkpoint_id: checkpoint_id.clone(),
                namespace_id: namespace_id.clone(),
                seq,
                label,
                created_at: Utc::now(),
                source_version: record.version,
                mime: record.mime.clone(),
                bytes: record.bytes,
                checksum: record.checksum.clone(),
                content,
            };

            let manifest = serde_json::to_vec(&checkpoint)
                .map_err(|e| Error::corrupted(namespace_id.as_str(), e.to_string()))?;
            let manifest_key = keys::checkpoint_manifest_key(sandbox_id, namespace_id, &checkpoint_id);
            with_deadline("storage.put", timeout, self.storage.put(&manifest_key, manifest)).await?;

            record.checkpoint_seq = seq;
            record.updated_at = Utc::now();
            self.publish(&record, timeout).await;

            tracing::debug!(
                namespace_id = %namespace_id,
                checkpoint_id = %checkpoint_id,
                seq,
                source_version = record.version,
                "checkpoint created"
            );
            Ok(checkpoint)
        }
        .instrument(span)
        .await
    }

    /// Replace the working state with a checkpoint's content.
    ///
    /// The checkpoint itself is untouched, so restoring the same checkpoint
    /// again yields the same content. Returns the new namespace version.
    pub async fn restore_namespace(
        &self,
        namespace_id: &NamespaceId,
        checkpoint_id: &str,
        ctx: &AccessContext,
    ) -> Result<u64> {
        let span = self.span("restore", Some(namespace_id));
        async move {
            validate_checkpoint_id(checkpoint_id)?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            let mut record = self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            let checkpoint = self
                .read_checkpoint(namespace_id, checkpoint_id, timeout)
                .await?
                .ok_or_else(|| checkpoint_not_found(namespace_id, checkpoint_id))?;
            if checkpoint.content.kind() != record.kind() {
                return Err(Error::corrupted(
                    namespace_id.as_str(),
                    format!(
                        "checkpoint '{}' holds {} content",
                        checkpoint_id,
                        checkpoint.content.kind().as_str()
                    ),
                ));
            }

            let version = record.version + 1;
            let content = self
                .relocate(
                    &checkpoint.content,
                    |entry| keys::version_key(&record, version, entry),
                    timeout,
                )
                .await?;
            record.content = content;
            record.mime = checkpoint.mime;

            self.commit(&mut record, version, timeout).await;
            tracing::debug!(
                namespace_id = %namespace_id,
                checkpoint_id,
                version,
                "namespace restored"
            );
            Ok(version)
        }
        .instrument(span)
        .await
    }

    /// Checkpoints of a namespace in creation order
    pub async fn list_checkpoints(
        &self,
        namespace_id: &NamespaceId,
        ctx: &AccessContext,
    ) -> Result<Vec<Checkpoint>> {
        let span = self.span("list_checkpoints", Some(namespace_id));
        async move {
            let timeout = self.timeout(ctx);
            self.load(Operation::Read, namespace_id, ctx, timeout).await?;
            self.read_checkpoints(namespace_id, timeout).await
        }
        .instrument(span)
        .await
    }

    pub async fn get_checkpoint(
        &self,
        namespace_id: &NamespaceId,
        checkpoint_id: &str,
        ctx: &AccessContext,
    ) -> Result<Checkpoint> {
        validate_checkpoint_id(checkpoint_id)?;
        let timeout = self.timeout(ctx);
        self.load(Operation::Read, namespace_id, ctx, timeout).await?;
        self.read_checkpoint(namespace_id, checkpoint_id, timeout)
            .await?
            .ok_or_else(|| checkpoint_not_found(namespace_id, checkpoint_id))
    }

    /// Delete one checkpoint. Returns false if it did not exist.
    pub async fn delete_checkpoint(
        &self,
        namespace_id: &NamespaceId,
        checkpoint_id: &str,
        ctx: &AccessContext,
    ) -> Result<bool> {
        let span = self.span("delete_checkpoint", Some(namespace_id));
        async move {
            validate_checkpoint_id(checkpoint_id)?;
            let timeout = self.timeout(ctx);
            let _guard = self.locks.acquire(namespace_id, timeout).await?;
            self.load(Operation::Write, namespace_id, ctx, timeout).await?;

            let sandbox_id = self.config.sandbox_id.as_str();
            let manifest_key = keys::checkpoint_manifest_key(sandbox_id, namespace_id, checkpoint_id);
            // Manifest first: the checkpoint disappears before its data does
            if !with_deadline("storage.delete", timeout, self.storage.delete(&manifest_key)).await? {
                return Ok(false);
            }
            let removed = self
                .delete_prefix(
                    &keys::checkpoint_dir(sandbox_id, namespace_id, checkpoint_id),
                    timeout,
                )
                .await?;
            tracing::debug!(namespace_id = %namespace_id, checkpoint_id, objects = removed, "checkpoint deleted");
            Ok(true)
        }
        .instrument(span)
        .await
    }

    async fn read_checkpoint(
        &self,
        namespace_id: &NamespaceId,
        checkpoint_id: &str,
        timeout: Duration,
    ) -> Result<Option<Checkpoint>> {
        let key = keys::checkpoint_manifest_key(&self.config.sandbox_id, namespace_id, checkpoint_id);
        if !with_deadline("storage.exists", timeout, self.storage.exists(&key)).await? {
            return Ok(None);
        }
        let raw = with_deadline("storage.get", timeout, self.storage.get(&key)).await?;
        let checkpoint: Checkpoint = serde_json::from_slice(&raw).map_err(|e| {
            Error::corrupted(
                namespace_id.as_str(),
                format!("checkpoint '{}': {}", checkpoint_id, e),
            )
        })?;
        Ok(Some(checkpoint))
    }

    /// Every readable manifest of a namespace, sorted by sequence number
    pub(crate) async fn read_checkpoints(
        &self,
        namespace_id: &NamespaceId,
        timeout: Duration,
    ) -> Result<Vec<Checkpoint>> {
        let sandbox_id = self.config.sandbox_id.as_str();
        let listed = with_deadline(
            "storage.list",
            timeout,
            self.storage
                .list(&keys::checkpoint_prefix(sandbox_id, namespace_id)),
        )
        .await?;

        let mut checkpoints = Vec::new();
        for key in listed {
            let Some((_, checkpoint_id, true)) = keys::parse_checkpoint_key(sandbox_id, &key) else {
                continue;
            };
            match self.read_checkpoint(namespace_id, &checkpoint_id, timeout).await {
                Ok(Some(checkpoint)) => checkpoints.push(checkpoint),
                Ok(None) => {}
                Err(err @ Error::CorruptedMetadata { .. }) => {
                    tracing::warn!(
                        namespace_id = %namespace_id,
                        checkpoint_id = %checkpoint_id,
                        error = %err,
                        "skipping unreadable checkpoint"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        checkpoints.sort_by_key(|c| c.seq);
        Ok(checkpoints)
    }
}
