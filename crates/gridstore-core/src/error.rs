use crate::access::Operation;
use crate::scope::Scope;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every public gridstore operation fails with exactly one of these kinds.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed grid path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    #[error("Access denied: {operation} on {scope}-scoped namespace")]
    AccessDenied { operation: Operation, scope: Scope },

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Namespace expired: {0}")]
    Expired(String),

    #[error("Corrupted metadata for '{namespace_id}': {reason}")]
    CorruptedMetadata { namespace_id: String, reason: String },

    #[error("Storage provider error: {0}")]
    Provider(String),

    #[error("'{operation}' exceeded its deadline of {timeout:?}")]
    ProviderTimeout { operation: String, timeout: Duration },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{operation} on a sandbox-scoped namespace requires an admin context")]
    AccessControlConfig { operation: Operation },
}

impl Error {
    /// Helper for creating validation errors
    ///
    /// # Example
    /// ```
    /// use gridstore_core::Error;
    /// let err = Error::validation("mime type must not be empty");
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Helper for creating storage provider errors
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider(msg.into())
    }

    pub fn malformed_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupted(namespace_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptedMetadata {
            namespace_id: namespace_id.into(),
            reason: reason.into(),
        }
    }

    /// True for both "never existed" and "lazily expired"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NamespaceNotFound(_) | Error::Expired(_))
    }

    /// True for any access-control refusal
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            Error::AccessDenied { .. } | Error::AccessControlConfig { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Provider(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(Error::NamespaceNotFound("a".into()).is_not_found());
        assert!(Error::Expired("a".into()).is_not_found());
        assert!(!Error::validation("bad").is_not_found());

        let denied = Error::AccessDenied {
            operation: Operation::Read,
            scope: Scope::Session,
        };
        assert!(denied.is_denied());
        assert!(
            Error::AccessControlConfig {
                operation: Operation::Delete
            }
            .is_denied()
        );
    }

    #[test]
    fn test_access_denied_message_names_operation_and_scope() {
        let err = Error::AccessDenied {
            operation: Operation::Write,
            scope: Scope::User,
        };
        assert_eq!(err.to_string(), "Access denied: write on user-scoped namespace");
    }

    #[test]
    fn test_io_error_maps_to_provider() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(io), Error::Provider(_)));
    }
}
