//! Workspace tree rules
//!
//! Entries are keyed by normalized path. Directories exist explicitly (made
//! with `make_directory`) or implicitly as ancestors of files. A path is
//! never both a file and a directory.

use crate::types::EntryInfo;
use gridstore_core::{Error, NamespaceId, Result, WorkspaceEntry};
use std::collections::BTreeMap;

type Entries = BTreeMap<String, WorkspaceEntry>;

fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

fn has_descendants(entries: &Entries, path: &str) -> bool {
    let prefix = format!("{}/", path);
    entries
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(key, _)| key.starts_with(&prefix))
}

fn check_ancestors(entries: &Entries, path: &str) -> Result<()> {
    for ancestor in ancestors(path) {
        if entries.get(ancestor).is_some_and(|e| !e.is_directory()) {
            return Err(Error::validation(format!(
                "'{}' is a file and cannot contain '{}'",
                ancestor, path
            )));
        }
    }
    Ok(())
}

/// Whether a file may be written at `path`
pub(crate) fn check_file_slot(entries: &Entries, path: &str) -> Result<()> {
    if entries.get(path).is_some_and(WorkspaceEntry::is_directory) || has_descendants(entries, path)
    {
        return Err(Error::validation(format!("'{}' is a directory", path)));
    }
    check_ancestors(entries, path)
}

/// Whether a directory may be made at `path`
pub(crate) fn check_directory_slot(entries: &Entries, path: &str) -> Result<()> {
    if entries.get(path).is_some_and(|e| !e.is_directory()) {
        return Err(Error::validation(format!("'{}' is a file", path)));
    }
    check_ancestors(entries, path)
}

/// `path` and every entry below it, in path order
pub(crate) fn subtree(entries: &Entries, path: &str) -> Vec<(String, WorkspaceEntry)> {
    let prefix = format!("{}/", path);
    entries
        .range(path.to_string()..)
        .take_while(|(key, _)| key.as_str() == path || key.starts_with(path))
        .filter(|(key, _)| key.as_str() == path || key.starts_with(&prefix))
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect()
}

/// Whether `path` names a directory, explicit or implied by its descendants
pub(crate) fn is_directory(entries: &Entries, path: &str) -> bool {
    match entries.get(path) {
        Some(entry) => entry.is_directory(),
        None => has_descendants(entries, path),
    }
}

/// Whether a whole subtree may be placed at `path`: nothing lives there yet
pub(crate) fn check_vacant(entries: &Entries, path: &str) -> Result<()> {
    if entries.contains_key(path) || has_descendants(entries, path) {
        return Err(Error::validation(format!("'{}' already exists", path)));
    }
    check_ancestors(entries, path)
}

/// Remove `path` and everything below it. Returns the number of entries removed.
pub(crate) fn remove(entries: &mut Entries, path: &str) -> usize {
    let prefix = format!("{}/", path);
    let before = entries.len();
    entries.retain(|key, _| key != path && !key.starts_with(&prefix));
    before - entries.len()
}

/// Immediate children of `dir` (`None` is the root), sorted by name
pub(crate) fn children(
    namespace_id: &NamespaceId,
    entries: &Entries,
    dir: Option<&str>,
) -> Result<Vec<EntryInfo>> {
    let prefix = match dir {
        Some(dir) => {
            match entries.get(dir) {
                Some(entry) if !entry.is_directory() => {
                    return Err(Error::validation(format!("'{}' is not a directory", dir)));
                }
                Some(_) => {}
                None if has_descendants(entries, dir) => {}
                None => {
                    return Err(Error::NamespaceNotFound(format!("{}/{}", namespace_id, dir)));
                }
            }
            format!("{}/", dir)
        }
        None => String::new(),
    };

    let mut listing: BTreeMap<String, EntryInfo> = BTreeMap::new();
    for (path, entry) in entries.range(prefix.clone()..) {
        let Some(rest) = path.strip_prefix(&prefix) else {
            break;
        };
        if rest.is_empty() {
            continue;
        }

        let (name, nested) = match rest.split_once('/') {
            Some((name, _)) => (name, true),
            None => (rest, false),
        };
        let child_path = format!("{}{}", prefix, name);

        let info = if nested {
            EntryInfo {
                path: child_path,
                name: name.to_string(),
                is_directory: true,
                bytes: 0,
                checksum: None,
                mime: None,
                modified_at: None,
            }
        } else {
            match entry {
                WorkspaceEntry::File { object } => EntryInfo {
                    path: child_path,
                    name: name.to_string(),
                    is_directory: false,
                    bytes: object.bytes,
                    checksum: Some(object.checksum.clone()),
                    mime: object.mime.clone(),
                    modified_at: Some(object.modified_at),
                },
                WorkspaceEntry::Directory { created_at } => EntryInfo {
                    path: child_path,
                    name: name.to_string(),
                    is_directory: true,
                    bytes: 0,
                    checksum: None,
                    mime: None,
                    modified_at: Some(*created_at),
                },
            }
        };

        // An explicit directory entry wins over the implicit one
        match listing.get(name) {
            Some(existing) if existing.modified_at.is_some() => {}
            _ => {
                listing.insert(name.to_string(), info);
            }
        }
    }

    Ok(listing.into_values().collect())
}
