//! Background reclamation
//!
//! Lazy expiry and the publish-last discipline both leave garbage behind:
//! expired records, objects of superseded versions, uploads nobody
//! registered, half-written checkpoints. Sweep removes them, taking the
//! namespace lock before touching any namespace's objects.

use crate::NamespaceStore;
use crate::keys;
use crate::types::SweepReport;
use chrono::{DateTime, Utc};
use gridstore_core::{Error, NamespaceId, Result, grid, with_deadline};
use gridstore_telemetry::{NamespaceSpanAttributes, trace_namespace_op};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::Instrument;

impl NamespaceStore {
    /// Run one reclamation pass over the sandbox
    pub async fn sweep(&self) -> Result<SweepReport> {
        let span = self.span("sweep", None);
        async move {
            let timeout = self.config.operation_timeout();
            let mut report = SweepReport::default();

            self.sweep_expired(&mut report, timeout).await?;
            self.sweep_data(&mut report, timeout).await?;
            self.sweep_checkpoints(&mut report, timeout).await?;

            if report.total() > 0 {
                tracing::info!(?report, "sweep reclaimed storage");
            } else {
                tracing::debug!("sweep found nothing to reclaim");
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn sweep_expired(&self, report: &mut SweepReport, timeout: Duration) -> Result<()> {
        for candidate in self.gateway.scan(timeout).await? {
            if !candidate.is_expired() {
                continue;
            }
            let namespace_id = &candidate.namespace_id;
            let _guard = self.locks.acquire(namespace_id, timeout).await?;

            // Re-read under the lock: the TTL may have been extended meanwhile
            let Some(record) = self.gateway.fetch(namespace_id, timeout).await? else {
                continue;
            };
            if !record.is_expired() {
                continue;
            }

            let objects = self.purge(&record, timeout).await?;
            if record.is_committed() {
                report.expired_namespaces += 1;
            } else {
                report.expired_uploads += 1;
            }
            trace_namespace_op(
                NamespaceSpanAttributes::new("sweep.expired", self.config.sandbox_id.as_str())
                    .with_scope(record.scope.as_str())
                    .with_namespace(namespace_id.as_str())
                    .with_kind(record.kind().as_str()),
                record.bytes,
                record.version,
            );
            tracing::debug!(namespace_id = %namespace_id, objects, "reclaimed expired namespace");
        }
        Ok(())
    }

    async fn sweep_data(&self, report: &mut SweepReport, timeout: Duration) -> Result<()> {
        let grace = chrono::Duration::from_std(self.config.sweep_grace())
            .map_err(|_| Error::validation("sweep grace period is out of range"))?;
        let grace_cutoff = Utc::now()
            .checked_sub_signed(grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let prefix = grid::sandbox_prefix(&self.config.sandbox_id)?;
        let listed = with_deadline("storage.list", timeout, self.storage.list(&prefix)).await?;

        let mut by_namespace: BTreeMap<NamespaceId, Vec<String>> = BTreeMap::new();
        for key in listed {
            match grid::decode(&key) {
                Ok(address) => by_namespace.entry(address.namespace_id).or_default().push(key),
                Err(err) => tracing::warn!(key = %key, error = %err, "skipping undecodable object key"),
            }
        }

        for (namespace_id, objects) in by_namespace {
            let _guard = self.locks.acquire(&namespace_id, timeout).await?;
            match self.gateway.fetch(&namespace_id, timeout).await {
                Ok(None) => {
                    report.orphaned_objects += self.delete_keys(&objects, timeout).await?;
                }
                Ok(Some(record)) => {
                    // Readers that loaded the previous record may still be fetching its objects
                    if record.updated_at > grace_cutoff {
                        tracing::debug!(namespace_id = %namespace_id, "namespace written recently; leaving superseded objects");
                        continue;
                    }
                    let referenced: HashSet<&str> = record.referenced_keys().into_iter().collect();
                    let parts = match &record.multipart_upload_id {
                        Some(upload_id) => Some(keys::multipart_prefix(&record, upload_id)?),
                        None => None,
                    };
                    let superseded: Vec<String> = objects
                        .into_iter()
                        .filter(|key| !referenced.contains(key.as_str()))
                        .filter(|key| parts.as_deref().is_none_or(|prefix| !key.starts_with(prefix)))
                        .collect();
                    report.superseded_objects += self.delete_keys(&superseded, timeout).await?;
                }
                Err(err) => {
                    // Never delete data whose record cannot be read
                    tracing::warn!(namespace_id = %namespace_id, error = %err, "leaving objects of unreadable namespace");
                }
            }
        }
        Ok(())
    }

    async fn sweep_checkpoints(&self, report: &mut SweepReport, timeout: Duration) -> Result<()> {
        let sandbox_id = self.config.sandbox_id.as_str();
        let listed = with_deadline(
            "storage.list",
            timeout,
            self.storage.list(&keys::checkpoints_root(sandbox_id)),
        )
        .await?;

        // namespace -> checkpoint -> (keys, has manifest)
        let mut by_namespace: BTreeMap<NamespaceId, BTreeMap<String, (Vec<String>, bool)>> =
            BTreeMap::new();
        for key in listed {
            let Some((namespace_id, checkpoint_id, is_manifest)) =
                keys::parse_checkpoint_key(sandbox_id, &key)
            else {
                continue;
            };
            let slot = by_namespace
                .entry(namespace_id)
                .or_default()
                .entry(checkpoint_id)
                .or_default();
            slot.0.push(key);
            slot.1 |= is_manifest;
        }

        for (namespace_id, checkpoints) in by_namespace {
            let _guard = self.locks.acquire(&namespace_id, timeout).await?;
            let record_exists = match self.gateway.fetch(&namespace_id, timeout).await {
                Ok(record) => record.is_some(),
                Err(err) => {
                    tracing::warn!(namespace_id = %namespace_id, error = %err, "leaving checkpoints of unreadable namespace");
                    continue;
                }
            };

            let doomed: Vec<String> = checkpoints
                .into_values()
                .filter(|(_, has_manifest)| !record_exists || !has_manifest)
                .flat_map(|(objects, _)| objects)
                .collect();
            report.orphaned_checkpoint_objects += self.delete_keys(&doomed, timeout).await?;
        }
        Ok(())
    }
}
