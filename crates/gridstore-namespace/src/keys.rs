//! Storage key layout
//!
//! ```text
//! {grid path}/_v{version}/_data                      blob payload
//! {grid path}/_v{version}/{entry path}               workspace file
//! {grid path}/_mpu/{upload id}/part-{number}          multipart upload part
//! checkpoints/{sandbox}/{namespace}/{checkpoint}/data/{entry}
//! checkpoints/{sandbox}/{namespace}/{checkpoint}/manifest.json
//! ```
//!
//! Data objects are never overwritten: every write lands under a new version
//! segment and becomes visible only when the metadata record pointing at it
//! is published.

use gridstore_core::{MetadataRecord, NamespaceId, Result};

pub(crate) const BLOB_ENTRY: &str = "_data";
const CHECKPOINT_ROOT: &str = "checkpoints";
const MANIFEST: &str = "manifest.json";
const MULTIPART_SEGMENT: &str = "_mpu";

/// Key of a blob payload (`entry = None`) or workspace file at `version`
pub(crate) fn version_key(record: &MetadataRecord, version: u64, entry: Option<&str>) -> Result<String> {
    let subpath = format!("_v{}/{}", version, entry.unwrap_or(BLOB_ENTRY));
    record.grid_address()?.with_subpath(subpath).encode()
}

/// Prefix covering every data object of a namespace
pub(crate) fn data_prefix(record: &MetadataRecord) -> Result<String> {
    Ok(format!("{}/", record.grid_path()?))
}

/// Prefix holding the uploaded parts of one multipart upload
pub(crate) fn multipart_prefix(record: &MetadataRecord, upload_id: &str) -> Result<String> {
    Ok(format!(
        "{}{}/{}/",
        data_prefix(record)?,
        MULTIPART_SEGMENT,
        upload_id
    ))
}

pub(crate) fn multipart_part_key(
    record: &MetadataRecord,
    upload_id: &str,
    part_number: u32,
) -> Result<String> {
    Ok(format!(
        "{}part-{:05}",
        multipart_prefix(record, upload_id)?,
        part_number
    ))
}

pub(crate) fn checkpoints_root(sandbox_id: &str) -> String {
    format!("{}/{}/", CHECKPOINT_ROOT, sandbox_id)
}

pub(crate) fn checkpoint_prefix(sandbox_id: &str, namespace_id: &NamespaceId) -> String {
    format!("{}{}/", checkpoints_root(sandbox_id), namespace_id)
}

pub(crate) fn checkpoint_dir(sandbox_id: &str, namespace_id: &NamespaceId, checkpoint_id: &str) -> String {
    format!("{}{}/", checkpoint_prefix(sandbox_id, namespace_id), checkpoint_id)
}

pub(crate) fn checkpoint_manifest_key(
    sandbox_id: &str,
    namespace_id: &NamespaceId,
    checkpoint_id: &str,
) -> String {
    format!("{}{}", checkpoint_dir(sandbox_id, namespace_id, checkpoint_id), MANIFEST)
}

pub(crate) fn checkpoint_data_key(
    sandbox_id: &str,
    namespace_id: &NamespaceId,
    checkpoint_id: &str,
    entry: Option<&str>,
) -> String {
    format!(
        "{}data/{}",
        checkpoint_dir(sandbox_id, namespace_id, checkpoint_id),
        entry.unwrap_or(BLOB_ENTRY)
    )
}

/// Split a key under [`checkpoints_root`] into namespace id, checkpoint id
/// and whether it is the manifest
pub(crate) fn parse_checkpoint_key(sandbox_id: &str, key: &str) -> Option<(NamespaceId, String, bool)> {
    let rest = key.strip_prefix(&checkpoints_root(sandbox_id))?;
    let mut parts = rest.splitn(3, '/');
    let namespace_id = parts.next().filter(|s| !s.is_empty())?;
    let checkpoint_id = parts.next().filter(|s| !s.is_empty())?;
    let tail = parts.next()?;
    Some((
        NamespaceId::from(namespace_id),
        checkpoint_id.to_string(),
        tail == MANIFEST,
    ))
}
