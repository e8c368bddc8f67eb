//! Audit log storage trait.

use async_trait::async_trait;
use kc_model::{AuditAction, EntityType, NewAuditAction, Page, PageRequest, RevertMark};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::mirror::MirrorWrite;

/// Filter applied to a log page query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditScope {
    /// Records performed by one actor.
    Actor(String),
    /// Records in one realm.
    Realm(String),
    /// Every record.
    Global,
    /// History of one entity.
    Entity {
        /// Kind of entity.
        entity_type: EntityType,
        /// Local entity id.
        entity_id: Uuid,
    },
}

impl AuditScope {
    /// Checks if a record falls inside this scope.
    #[must_use]
    pub fn matches(&self, action: &AuditAction) -> bool {
        match self {
            Self::Actor(subject) => action.actor.subject_id == *subject,
            Self::Realm(realm) => action.entity.realm_name == *realm,
            Self::Global => true,
            Self::Entity {
                entity_type,
                entity_id,
            } => action.entity_type == *entity_type && action.entity.entity_id == *entity_id,
        }
    }
}

/// Append-only change log paired with the local mirror.
///
/// Implementations must be thread-safe and support concurrent access.
/// Every write operation is a single atomic unit of work: the mirror write
/// and the log changes are either all durable or none are.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Gets a record by id.
    async fn get_action(&self, id: Uuid) -> StorageResult<Option<AuditAction>>;

    /// Checks if the entity has an un-reverted record ordered after
    /// `sequence`.
    async fn has_later_unreverted(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        sequence: i64,
    ) -> StorageResult<bool>;

    /// Returns one page of records in `scope`, newest sequence first.
    ///
    /// The page and its total come from the same consistent read.
    async fn page_actions(
        &self,
        scope: &AuditScope,
        request: PageRequest,
    ) -> StorageResult<Page<AuditAction>>;

    /// Applies a mirror write and appends a record.
    ///
    /// Returns the persisted record with its assigned sequence.
    async fn commit(
        &self,
        write: MirrorWrite,
        action: NewAuditAction,
    ) -> StorageResult<AuditAction>;

    /// Applies a compensating mirror write, marks the original record
    /// reverted and appends the compensating record.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Conflict` if the original record was already
    /// reverted or is already the target of another compensating record.
    /// Returns `StorageError::NotFound` if the original record is absent.
    async fn commit_revert(
        &self,
        write: MirrorWrite,
        mark: RevertMark,
        compensation: NewAuditAction,
    ) -> StorageResult<AuditAction>;
}
