//! Local mirror of identity provider entities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kc_model::{EntityType, Snapshot};
use uuid::Uuid;

use crate::error::StorageResult;

/// One entity as mirrored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntity {
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Local id.
    pub id: Uuid,
    /// Owning realm name.
    pub realm_name: String,
    /// Id assigned by the identity provider.
    pub idp_id: Option<String>,
    /// Human-readable name.
    pub name: String,
    /// Last known state.
    pub state: Snapshot,
    /// When the mirror row was last written.
    pub updated_at: DateTime<Utc>,
}

/// Mirror mutation carried alongside an audit append.
///
/// The store applies it in the same unit of work as the log write.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorWrite {
    /// Insert or replace the entity.
    Upsert(MirrorEntity),
    /// Remove the entity. Removing an absent entity is a no-op.
    Delete {
        /// Kind of entity.
        entity_type: EntityType,
        /// Local id.
        id: Uuid,
    },
}

impl MirrorWrite {
    /// Returns the key of the entity this write touches.
    #[must_use]
    pub const fn key(&self) -> (EntityType, Uuid) {
        match self {
            Self::Upsert(entity) => (entity.entity_type, entity.id),
            Self::Delete { entity_type, id } => (*entity_type, *id),
        }
    }
}

/// Read access to the local mirror.
///
/// Writes only happen through [`crate::AuditStore`] so that every mirror
/// mutation is paired with a log record.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Gets a mirrored entity.
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> StorageResult<Option<MirrorEntity>>;

    /// Finds the mirrored entity bound to an identity provider id.
    async fn find_by_idp_id(
        &self,
        entity_type: EntityType,
        realm_name: &str,
        idp_id: &str,
    ) -> StorageResult<Option<MirrorEntity>>;

    /// Lists mirrored entities of one type in a realm, ordered by name.
    async fn list_entities(
        &self,
        entity_type: EntityType,
        realm_name: &str,
    ) -> StorageResult<Vec<MirrorEntity>>;
}
