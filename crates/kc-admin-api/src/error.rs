//! Admin API error types.
//!
//! Maps audit errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kc_audit::AuditError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the audit API.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Resource not found.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Type of entity.
        entity_type: &'static str,
        /// Resource identifier.
        id: String,
    },

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request data.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication required.
    #[error("Authentication required")]
    Unauthorized,

    /// Insufficient permissions.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Identity provider call failed; nothing was changed locally.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Failure description.
        message: String,
        /// Whether repeating the request may succeed.
        retryable: bool,
    },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdminError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Upstream { .. } => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<AuditError> for AdminError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            AuditError::Conflict(message) => Self::Conflict(message),
            AuditError::Validation(message) => Self::Validation(message),
            AuditError::Upstream(upstream) => Self::Upstream {
                retryable: upstream.is_retryable(),
                message: upstream.to_string(),
            },
            err @ (AuditError::PartialFailure { .. } | AuditError::Storage(_)) => {
                tracing::error!(error = %err, "audit request failed");
                Self::Internal(err.to_string())
            }
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error: String,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Whether repeating the request may succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retryable = match &self {
            Self::Upstream { retryable, .. } => Some(*retryable),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            error_description: Some(self.to_string()),
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for Admin API operations.
pub type AdminResult<T> = Result<T, AdminError>;
