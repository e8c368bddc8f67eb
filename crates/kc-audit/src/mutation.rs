//! Audited entity writes.
//!
//! Every write goes to the identity provider first. The mirror write and
//! its change record are then committed together through the
//! [`AuditRecorder`]. A local failure after the provider accepted the write
//! is reported as [`AuditError::PartialFailure`].

use std::sync::Arc;

use kc_model::{Actor, AuditAction, EntityRef, EntityType, Snapshot};
use kc_storage::{MirrorEntity, MirrorWrite};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuditError, AuditResult};
use crate::recorder::{ActionDraft, AuditRecorder};
use crate::upstream::{name_key, UpstreamProvider};
use crate::AuditBackend;

/// Creates, updates and deletes entities with an audit trail.
pub struct EntityMutationService<S, U> {
    store: Arc<S>,
    recorder: AuditRecorder<S>,
    upstream: Arc<U>,
    clock: Arc<dyn Clock>,
}

impl<S, U> Clone for EntityMutationService<S, U> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            recorder: self.recorder.clone(),
            upstream: Arc::clone(&self.upstream),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, U> EntityMutationService<S, U>
where
    S: AuditBackend,
    U: UpstreamProvider,
{
    /// Creates a mutation service.
    pub fn new(store: Arc<S>, upstream: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            recorder: AuditRecorder::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            upstream,
            clock,
        }
    }

    /// Creates an entity in `realm`.
    ///
    /// The entity's name is read from its natural key field (`username`,
    /// `clientId`, `alias`, ...).
    ///
    /// # Errors
    ///
    /// - `Validation` if the name field is missing or the actor or realm is
    ///   blank
    /// - `Upstream` if the identity provider rejected the write
    /// - `PartialFailure` if the provider accepted it but the local commit
    ///   failed
    pub async fn create(
        &self,
        actor: Actor,
        realm: &str,
        entity_type: EntityType,
        state: Snapshot,
    ) -> AuditResult<AuditAction> {
        let name = entity_name(entity_type, &state)?;
        let entity = EntityRef::new(Uuid::now_v7(), name, realm);
        ActionDraft::create(actor.clone(), entity_type, entity.clone(), state.clone()).validate()?;

        let created = self.upstream.create(realm, entity_type, &state).await?;
        let entity = entity.with_idp_id(created.idp_id.clone());

        let write = MirrorWrite::Upsert(self.mirror_entity(entity_type, &entity, created.state.clone()));
        let draft = ActionDraft::create(actor, entity_type, entity, created.state);
        self.commit(write, draft).await
    }

    /// Applies `changes` to a mirrored entity.
    ///
    /// Fields absent from `changes` are left alone; explicit nulls clear a
    /// field.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity is not mirrored or no longer exists
    ///   upstream
    /// - `Validation` if `changes` is empty
    /// - `Upstream` if the identity provider rejected the write
    /// - `PartialFailure` if the provider accepted it but the local commit
    ///   failed
    pub async fn update(
        &self,
        actor: Actor,
        entity_type: EntityType,
        entity_id: Uuid,
        changes: Snapshot,
    ) -> AuditResult<AuditAction> {
        if changes.is_empty() {
            return Err(AuditError::validation("update must change at least one field"));
        }
        let mirrored = self.mirrored(entity_type, entity_id).await?;
        let idp_id = mirrored.idp_id.clone().unwrap_or_else(|| mirrored.name.clone());
        let entity = entity_ref(&mirrored, &idp_id);
        ActionDraft::update(actor.clone(), entity_type, entity.clone(), Snapshot::new(), changes.clone())
            .validate()?;

        let before = self
            .upstream
            .get(&mirrored.realm_name, entity_type, &idp_id)
            .await?
            .map_or_else(|| mirrored.state.clone(), |current| current.state);

        self.upstream
            .update(&mirrored.realm_name, entity_type, &idp_id, &changes)
            .await?;

        let mut after = before.clone();
        for (field, value) in changes.fields() {
            after.insert(field, value.clone());
        }

        let mut entity = entity;
        if let Some(name) = after.text(name_key(entity_type)) {
            entity.name = name.to_string();
        }

        let write = MirrorWrite::Upsert(self.mirror_entity(entity_type, &entity, after.clone()));
        let draft = ActionDraft::update(actor, entity_type, entity, before, after);
        self.commit(write, draft).await
    }

    /// Deletes a mirrored entity.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity is not mirrored
    /// - `Upstream` if the identity provider rejected the write
    /// - `PartialFailure` if the provider accepted it but the local commit
    ///   failed
    pub async fn delete(
        &self,
        actor: Actor,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> AuditResult<AuditAction> {
        let mirrored = self.mirrored(entity_type, entity_id).await?;
        let idp_id = mirrored.idp_id.clone().unwrap_or_else(|| mirrored.name.clone());
        let entity = entity_ref(&mirrored, &idp_id);
        ActionDraft::delete(actor.clone(), entity_type, entity.clone(), Snapshot::new()).validate()?;

        let before = self
            .upstream
            .get(&mirrored.realm_name, entity_type, &idp_id)
            .await?
            .map_or_else(|| mirrored.state.clone(), |current| current.state);

        self.upstream
            .delete(&mirrored.realm_name, entity_type, &idp_id)
            .await?;

        let write = MirrorWrite::Delete {
            entity_type,
            id: entity_id,
        };
        let draft = ActionDraft::delete(actor, entity_type, entity, before);
        self.commit(write, draft).await
    }

    async fn mirrored(&self, entity_type: EntityType, entity_id: Uuid) -> AuditResult<MirrorEntity> {
        self.store
            .get_entity(entity_type, entity_id)
            .await?
            .ok_or_else(|| AuditError::not_found(entity_type.as_str(), entity_id))
    }

    async fn commit(&self, write: MirrorWrite, draft: ActionDraft) -> AuditResult<AuditAction> {
        let entity_type = draft.entity_type;
        let entity_id = draft.entity.entity_id;
        let action_type = draft.action_type;

        self.recorder.record(write, draft).await.map_err(|err| {
            tracing::error!(
                inconsistency = true,
                %action_type,
                %entity_type,
                %entity_id,
                error = %err,
                "identity provider updated but local commit failed"
            );
            AuditError::partial_failure(format!(
                "identity provider applied the {action_type} of {entity_type} {entity_id} \
                 but the local mirror and log were not updated: {err}"
            ))
        })
    }

    fn mirror_entity(&self, entity_type: EntityType, entity: &EntityRef, state: Snapshot) -> MirrorEntity {
        MirrorEntity {
            entity_type,
            id: entity.entity_id,
            realm_name: entity.realm_name.clone(),
            idp_id: entity.idp_id.clone(),
            name: entity.name.clone(),
            state,
            updated_at: self.clock.now(),
        }
    }
}

fn entity_name(entity_type: EntityType, state: &Snapshot) -> AuditResult<String> {
    state
        .text(name_key(entity_type))
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            AuditError::validation(format!(
                "{} requires a non-blank '{}'",
                entity_type.label(),
                name_key(entity_type)
            ))
        })
}

fn entity_ref(mirrored: &MirrorEntity, idp_id: &str) -> EntityRef {
    EntityRef::new(mirrored.id, mirrored.name.clone(), mirrored.realm_name.clone()).with_idp_id(idp_id)
}
