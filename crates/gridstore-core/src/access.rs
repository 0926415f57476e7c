//! Access-control decision engine
//!
//! | Scope   | Read                    | Write / Delete          |
//! |---------|-------------------------|-------------------------|
//! | session | caller session == owner | caller session == owner |
//! | user    | caller user == owner    | caller user == owner    |
//! | sandbox | always                  | caller is admin         |
//!
//! [`check_access`] is the only place scope comparisons happen.

use crate::error::{Error, Result};
use crate::scope::ScopeOwner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
        })
    }
}

/// Caller identity for a single operation. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub is_admin: bool,
    /// Per-call deadline for each back-end round trip; falls back to the
    /// configured operation timeout when unset.
    pub timeout: Option<Duration>,
}

impl AccessContext {
    /// A context with no identity; can only read sandbox-scoped namespaces
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Self::default()
        }
    }

    /// Context that owns the given scope owner
    pub fn for_owner(owner: &ScopeOwner) -> Self {
        match owner {
            ScopeOwner::Session(id) => Self::session(id.clone()),
            ScopeOwner::User(id) => Self::user(id.clone()),
            ScopeOwner::Sandbox => Self::admin(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Decide whether `ctx` may perform `operation` on a namespace owned by `owner`.
///
/// Denials carry only the operation and scope, never the owner identity.
pub fn check_access(operation: Operation, owner: &ScopeOwner, ctx: &AccessContext) -> Result<()> {
    let allowed = match owner {
        ScopeOwner::Session(session_id) => ctx.session_id.as_deref() == Some(session_id.as_str()),
        ScopeOwner::User(user_id) => ctx.user_id.as_deref() == Some(user_id.as_str()),
        ScopeOwner::Sandbox => match operation {
            Operation::Read => true,
            Operation::Write | Operation::Delete if ctx.is_admin => true,
            Operation::Write | Operation::Delete => {
                return Err(Error::AccessControlConfig { operation });
            }
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(Error::AccessDenied {
            operation,
            scope: owner.scope(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    const ALL_OPS: [Operation; 3] = [Operation::Read, Operation::Write, Operation::Delete];

    #[test]
    fn test_session_scope_requires_matching_session() {
        let owner = ScopeOwner::session("s1");
        for op in ALL_OPS {
            assert!(check_access(op, &owner, &AccessContext::session("s1")).is_ok());

            let err = check_access(op, &owner, &AccessContext::session("s2")).unwrap_err();
            assert!(matches!(
                err,
                Error::AccessDenied { operation, scope: Scope::Session } if operation == op
            ));

            // Admin flag does not override session ownership
            assert!(check_access(op, &owner, &AccessContext::admin()).is_err());
        }
    }

    #[test]
    fn test_user_scope_ignores_session() {
        let owner = ScopeOwner::user("alice");
        let alice_elsewhere = AccessContext::session("any-session").with_user("alice");
        for op in ALL_OPS {
            assert!(check_access(op, &owner, &alice_elsewhere).is_ok());
            assert!(check_access(op, &owner, &AccessContext::user("bob")).is_err());
            assert!(check_access(op, &owner, &AccessContext::anonymous()).is_err());
        }
    }

    #[test]
    fn test_sandbox_scope_is_world_readable_admin_writable() {
        let owner = ScopeOwner::Sandbox;
        assert!(check_access(Operation::Read, &owner, &AccessContext::anonymous()).is_ok());

        for op in [Operation::Write, Operation::Delete] {
            let err = check_access(op, &owner, &AccessContext::session("s1")).unwrap_err();
            assert!(matches!(err, Error::AccessControlConfig { operation } if operation == op));
            assert!(check_access(op, &owner, &AccessContext::admin()).is_ok());
        }
    }

    #[test]
    fn test_for_owner_builds_owning_context() {
        for owner in [ScopeOwner::session("s"), ScopeOwner::user("u"), ScopeOwner::Sandbox] {
            let ctx = AccessContext::for_owner(&owner);
            for op in ALL_OPS {
                assert!(check_access(op, &owner, &ctx).is_ok());
            }
        }
    }
}
