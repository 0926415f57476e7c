//! Grid addressing codec
//!
//! Maps `(sandbox, scope owner, namespace id, subpath)` onto canonical paths:
//!
//! ```text
//! grid/{sandbox_id}/sessions/{session_id}/{namespace_id}[/{subpath}]
//! grid/{sandbox_id}/users/{user_id}/{namespace_id}[/{subpath}]
//! grid/{sandbox_id}/shared/{namespace_id}[/{subpath}]
//! ```
//!
//! The decoder also accepts the legacy two-level form
//! `grid/{sandbox_id}/{session_id}/{artifact_id}` as a session-scoped address.
//!
//! Identity components are escaped (`%` as `%25`, `/` as `%2F`) so that
//! `decode(encode(..))` is exact for every non-empty component. Subpaths are
//! normalized first (no leading/trailing `/`, no empty, `.` or `..` segments).

use crate::error::{Error, Result};
use crate::scope::{NamespaceId, ScopeOwner};

pub const GRID_ROOT: &str = "grid";
const SESSIONS_SEGMENT: &str = "sessions";
const USERS_SEGMENT: &str = "users";
const SHARED_SEGMENT: &str = "shared";

/// Decoded form of a grid path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAddress {
    pub sandbox_id: String,
    pub owner: ScopeOwner,
    pub namespace_id: NamespaceId,
    pub subpath: Option<String>,
}

impl GridAddress {
    pub fn new(sandbox_id: impl Into<String>, owner: ScopeOwner, namespace_id: NamespaceId) -> Self {
        Self {
            sandbox_id: sandbox_id.into(),
            owner,
            namespace_id,
            subpath: None,
        }
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    pub fn encode(&self) -> Result<String> {
        encode(
            &self.sandbox_id,
            &self.owner,
            &self.namespace_id,
            self.subpath.as_deref(),
        )
    }
}

/// Encode an address. Deterministic: identical inputs give identical strings.
pub fn encode(
    sandbox_id: &str,
    owner: &ScopeOwner,
    namespace_id: &NamespaceId,
    subpath: Option<&str>,
) -> Result<String> {
    let mut path = owner_prefix(sandbox_id, owner)?;
    path.push_str(&escape_component("namespace_id", namespace_id.as_str())?);

    if let Some(sub) = subpath.map(normalize_subpath).transpose()?.flatten() {
        for segment in sub.split('/') {
            path.push('/');
            path.push_str(&segment.replace('%', "%25"));
        }
    }

    Ok(path)
}

/// Prefix under which every namespace of one owner lives, with trailing `/`
pub fn owner_prefix(sandbox_id: &str, owner: &ScopeOwner) -> Result<String> {
    let mut path = sandbox_prefix(sandbox_id)?;
    match owner {
        ScopeOwner::Session(session_id) => {
            path.push_str(SESSIONS_SEGMENT);
            path.push('/');
            path.push_str(&escape_component("session_id", session_id)?);
        }
        ScopeOwner::User(user_id) => {
            path.push_str(USERS_SEGMENT);
            path.push('/');
            path.push_str(&escape_component("user_id", user_id)?);
        }
        ScopeOwner::Sandbox => path.push_str(SHARED_SEGMENT),
    }
    path.push('/');
    Ok(path)
}

/// Prefix covering a whole sandbox, with trailing `/`
pub fn sandbox_prefix(sandbox_id: &str) -> Result<String> {
    Ok(format!(
        "{}/{}/",
        GRID_ROOT,
        escape_component("sandbox_id", sandbox_id)?
    ))
}

/// Decode a current or legacy grid path
pub fn decode(path: &str) -> Result<GridAddress> {
    let segments: Vec<&str> = path.split('/').collect();

    if segments.first() != Some(&GRID_ROOT) {
        return Err(Error::malformed_path(path, "must start with 'grid/'"));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::malformed_path(path, "empty path segment"));
    }
    if segments.len() < 4 {
        return Err(Error::malformed_path(path, "too few path segments"));
    }

    let sandbox_id = unescape_component(path, segments[1])?;

    let (owner, rest) = match segments[2] {
        SESSIONS_SEGMENT | USERS_SEGMENT => {
            if segments.len() < 5 {
                return Err(Error::malformed_path(path, "missing owner or namespace id"));
            }
            let id = unescape_component(path, segments[3])?;
            let owner = if segments[2] == SESSIONS_SEGMENT {
                ScopeOwner::Session(id)
            } else {
                ScopeOwner::User(id)
            };
            (owner, &segments[4..])
        }
        SHARED_SEGMENT => (ScopeOwner::Sandbox, &segments[3..]),
        legacy_session if segments.len() == 4 => (
            ScopeOwner::Session(unescape_component(path, legacy_session)?),
            &segments[3..],
        ),
        _ => {
            return Err(Error::malformed_path(
                path,
                "unknown scope segment or legacy path with extra segments",
            ));
        }
    };

    let namespace_id = NamespaceId::from(unescape_component(path, rest[0])?);
    let subpath = if rest.len() > 1 {
        let parts = rest[1..]
            .iter()
            .map(|segment| unescape_component(path, segment))
            .collect::<Result<Vec<_>>>()?;
        Some(parts.join("/"))
    } else {
        None
    };

    Ok(GridAddress {
        sandbox_id,
        owner,
        namespace_id,
        subpath,
    })
}

/// Normalize a workspace-style path: `"/src//main.rs/"` is rejected,
/// `"/src/main.rs"` becomes `"src/main.rs"`, `"/"` becomes `None`.
pub fn normalize_subpath(subpath: &str) -> Result<Option<String>> {
    let trimmed = subpath.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }

    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(Error::validation(format!(
                "invalid path '{}': empty or relative segment",
                subpath
            )));
        }
    }

    Ok(Some(trimmed.to_string()))
}

fn escape_component(name: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::validation(format!("{} must not be empty", name)));
    }
    Ok(value.replace('%', "%25").replace('/', "%2F"))
}

fn unescape_component(path: &str, raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        match rest.get(idx + 1..idx + 3) {
            Some("25") => out.push('%'),
            Some("2F") | Some("2f") => out.push('/'),
            _ => return Err(Error::malformed_path(path, "invalid escape sequence")),
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);

    Ok(out)
}
