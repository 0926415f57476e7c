//! Scope, ownership and namespace identifiers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Security domain of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Ephemeral, bound to one session
    Session,
    /// Persistent, bound to one user across sessions
    User,
    /// Shared across the sandbox, writable by admins only
    Sandbox,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Session => "session",
            Scope::User => "user",
            Scope::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "session" => Ok(Scope::Session),
            "user" => Ok(Scope::User),
            "sandbox" => Ok(Scope::Sandbox),
            other => Err(Error::validation(format!("unknown scope '{}'", other))),
        }
    }
}

/// A scope together with the identity that owns it.
///
/// This is the only place the scope/owner pairing is expressed, so a session
/// namespace can never exist without a session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeOwner {
    Session(String),
    User(String),
    Sandbox,
}

impl ScopeOwner {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session(session_id.into())
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::User(user_id.into())
    }

    pub fn scope(&self) -> Scope {
        match self {
            Self::Session(_) => Scope::Session,
            Self::User(_) => Scope::User,
            Self::Sandbox => Scope::Sandbox,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Session(id) => Some(id),
            _ => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User(id) => Some(id),
            _ => None,
        }
    }

    /// Reject owners whose identity is blank
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Session(id) if id.trim().is_empty() => {
                Err(Error::validation("session scope requires a session_id"))
            }
            Self::User(id) if id.trim().is_empty() => {
                Err(Error::validation("user scope requires a user_id"))
            }
            Self::Session(id) | Self::User(id) if id == "." || id == ".." => Err(
                Error::validation(format!("'{}' is not a valid owner id", id)),
            ),
            _ => Ok(()),
        }
    }
}

/// Opaque, globally unique namespace identifier.
///
/// Callers must treat the value as an addressing token; nothing about its
/// format is part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NamespaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for NamespaceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NamespaceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_round_trips_through_str() {
        for scope in [Scope::Session, Scope::User, Scope::Sandbox] {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert!("global".parse::<Scope>().is_err());
    }

    #[test]
    fn test_owner_accessors() {
        let owner = ScopeOwner::session("s1");
        assert_eq!(owner.scope(), Scope::Session);
        assert_eq!(owner.session_id(), Some("s1"));
        assert_eq!(owner.user_id(), None);

        assert_eq!(ScopeOwner::Sandbox.scope(), Scope::Sandbox);
        assert!(ScopeOwner::user(" ").validate().is_err());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = NamespaceId::generate();
        let b = NamespaceId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().contains('/'));
    }

    #[test]
    fn test_owner_rejects_dot_segments() {
        for id in [".", ".."] {
            let session = ScopeOwner::Session(id.to_string()).validate();
            assert!(matches!(session, Err(Error::Validation(_))));
            let user = ScopeOwner::User(id.to_string()).validate();
            assert!(matches!(user, Err(Error::Validation(_))));
        }
        assert!(ScopeOwner::Session("a.b".to_string()).validate().is_ok());
        assert!(ScopeOwner::User("...".to_string()).validate().is_ok());
    }
}
