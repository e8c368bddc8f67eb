//! Identity provider contract.
//!
//! The audit subsystem writes to the identity provider before it touches
//! local state. [`UpstreamProvider`] is the seam; [`KeycloakAdminClient`]
//! talks to the Keycloak admin REST API and [`InMemoryUpstream`] backs tests
//! and local development.

mod keycloak;
mod memory;

use async_trait::async_trait;
use kc_model::{EntityType, Snapshot};
use thiserror::Error;

pub use keycloak::KeycloakAdminClient;
pub use memory::InMemoryUpstream;

/// Errors returned by the identity provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Entity does not exist upstream.
    #[error("{entity_type} '{id}' not found in identity provider")]
    NotFound {
        /// Kind of entity.
        entity_type: EntityType,
        /// Identity provider id or name.
        id: String,
    },

    /// Entity already exists or the write conflicts with upstream state.
    #[error("Identity provider conflict: {0}")]
    Conflict(String),

    /// Credentials were rejected.
    #[error("Identity provider rejected credentials")]
    Unauthorized,

    /// Request was rejected as invalid.
    #[error("Identity provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Provider unreachable, timed out, or failed internally.
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),

    /// Provider answered with something that could not be interpreted.
    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

impl UpstreamError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Checks if the call may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for identity provider calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// An entity as the identity provider returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEntity {
    /// Id assigned by the identity provider.
    pub idp_id: String,
    /// Full representation.
    pub state: Snapshot,
}

/// Representation key holding the human-readable name of an entity.
#[must_use]
pub const fn name_key(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::User => "username",
        EntityType::Client => "clientId",
        EntityType::Role | EntityType::Group => "name",
        EntityType::Idp => "alias",
        EntityType::Realm => "realm",
    }
}

/// Checks if the identity provider addresses this entity type by name
/// rather than by a generated id.
#[must_use]
pub const fn is_name_keyed(entity_type: EntityType) -> bool {
    matches!(
        entity_type,
        EntityType::Role | EntityType::Idp | EntityType::Realm
    )
}

/// Identity provider admin operations.
///
/// Implementations must be thread-safe. No caller holds a lock across
/// these calls.
#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Gets an entity by identity provider id.
    async fn get(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>>;

    /// Finds an entity by its human-readable name.
    async fn find_by_name(
        &self,
        realm: &str,
        entity_type: EntityType,
        name: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>>;

    /// Creates an entity and returns it with its assigned id.
    ///
    /// ## Errors
    ///
    /// Returns `UpstreamError::Conflict` if an entity with the same name
    /// already exists.
    async fn create(
        &self,
        realm: &str,
        entity_type: EntityType,
        state: &Snapshot,
    ) -> UpstreamResult<UpstreamEntity>;

    /// Applies the given fields to an existing entity. Fields not present
    /// in `state` are left unchanged; explicit nulls clear a field.
    ///
    /// ## Errors
    ///
    /// Returns `UpstreamError::NotFound` if the entity doesn't exist.
    async fn update(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
        state: &Snapshot,
    ) -> UpstreamResult<()>;

    /// Deletes an entity.
    ///
    /// ## Errors
    ///
    /// Returns `UpstreamError::NotFound` if the entity doesn't exist.
    async fn delete(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<()>;

    /// Lists every entity of one type in a realm.
    async fn list(
        &self,
        realm: &str,
        entity_type: EntityType,
    ) -> UpstreamResult<Vec<UpstreamEntity>>;
}
