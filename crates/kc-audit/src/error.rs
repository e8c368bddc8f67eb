//! Audit error types.

use kc_storage::StorageError;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Errors raised by recording, querying and reverting audited changes.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Action or entity does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Type of the missing item (e.g., "AuditAction", "User").
        entity_type: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Already reverted, superseded by a later change, or lost a race.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rejected input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identity provider call failed before any local change.
    #[error("Identity provider error: {0}")]
    Upstream(#[from] UpstreamError),

    /// The identity provider was changed but the local write failed.
    ///
    /// Repeating the provider call is not the recovery path; the local
    /// state must be repaired or the operation retried after re-checking
    /// the provider.
    #[error("Partial failure: {message}")]
    PartialFailure {
        /// What was applied and what was not.
        message: String,
    },

    /// Store failure unrelated to the above.
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl AuditError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a partial failure error.
    #[must_use]
    pub fn partial_failure(message: impl Into<String>) -> Self {
        Self::PartialFailure {
            message: message.into(),
        }
    }

    /// Checks if repeating the whole operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(err) => err.is_retryable(),
            Self::Storage(StorageError::Connection(_)) => true,
            _ => false,
        }
    }

    /// Checks if this is a degraded outcome rather than a hard failure.
    #[must_use]
    pub const fn is_partial_failure(&self) -> bool {
        matches!(self, Self::PartialFailure { .. })
    }
}

impl From<StorageError> for AuditError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity_type, id } => Self::not_found(entity_type, id),
            err if err.is_conflict() => Self::Conflict(err.to_string()),
            err => Self::Storage(err),
        }
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn storage_conflicts_become_conflicts() {
        let err: AuditError = StorageError::conflict("lost").into();
        assert!(matches!(err, AuditError::Conflict(_)));

        let err: AuditError = StorageError::duplicate("AuditAction", "reverts_action_id", "x").into();
        assert!(matches!(err, AuditError::Conflict(_)));
    }

    #[test]
    fn storage_not_found_keeps_identity() {
        let id = Uuid::now_v7();
        let err: AuditError = StorageError::not_found("AuditAction", id).into();

        match err {
            AuditError::NotFound { entity_type, id: found } => {
                assert_eq!(entity_type, "AuditAction");
                assert_eq!(found, id.to_string());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_storage_errors_pass_through() {
        let err: AuditError = StorageError::Query("syntax".into()).into();
        assert!(matches!(err, AuditError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn upstream_outages_are_retryable() {
        let err: AuditError = UpstreamError::Unavailable("timeout".into()).into();
        assert!(err.is_retryable());
        assert!(!err.is_partial_failure());
    }
}
