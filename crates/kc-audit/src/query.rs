//! Paged reads of the change log.

use std::sync::Arc;

use kc_model::{AuditAction, EntityType, Page, PageRequest};
use kc_storage::{AuditScope, AuditStore};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Read-only access to the change log.
pub struct AuditQueryService<S> {
    store: Arc<S>,
}

impl<S> Clone for AuditQueryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AuditStore> AuditQueryService<S> {
    /// Creates a query service.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records performed by one actor, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an out-of-range page size.
    pub async fn for_actor(&self, subject_id: &str, request: PageRequest) -> AuditResult<Page<AuditAction>> {
        self.page(AuditScope::Actor(subject_id.to_string()), request).await
    }

    /// Records in one realm, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an out-of-range page size.
    pub async fn for_realm(&self, realm_name: &str, request: PageRequest) -> AuditResult<Page<AuditAction>> {
        self.page(AuditScope::Realm(realm_name.to_string()), request).await
    }

    /// Every record, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an out-of-range page size.
    pub async fn global(&self, request: PageRequest) -> AuditResult<Page<AuditAction>> {
        self.page(AuditScope::Global, request).await
    }

    /// History of one entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for an out-of-range page size.
    pub async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        request: PageRequest,
    ) -> AuditResult<Page<AuditAction>> {
        self.page(
            AuditScope::Entity {
                entity_type,
                entity_id,
            },
            request,
        )
        .await
    }

    /// Gets one record.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if the record does not exist.
    pub async fn get(&self, action_id: Uuid) -> AuditResult<AuditAction> {
        self.store
            .get_action(action_id)
            .await?
            .ok_or_else(|| AuditError::not_found("AuditAction", action_id))
    }

    async fn page(&self, scope: AuditScope, request: PageRequest) -> AuditResult<Page<AuditAction>> {
        request.validate().map_err(AuditError::validation)?;
        Ok(self.store.page_actions(&scope, request).await?)
    }
}
