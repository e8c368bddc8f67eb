//! Appending change records.
//!
//! Every record is appended in the same unit of work as the mirror write it
//! documents. The recorder computes the field-level diff, stamps the record
//! and hands both writes to the store as one commit.

use std::collections::BTreeSet;
use std::sync::Arc;

use kc_model::{
    ActionType, Actor, AuditAction, EntityRef, EntityType, NewAuditAction, RevertMark, Snapshot,
};
use kc_storage::{AuditStore, MirrorWrite};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuditError, AuditResult};

/// A change about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDraft {
    /// Who performed the change.
    pub actor: Actor,
    /// Kind of mutation.
    pub action_type: ActionType,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Entity the change applies to.
    pub entity: EntityRef,
    /// State before the change.
    pub before: Option<Snapshot>,
    /// State after the change.
    pub after: Option<Snapshot>,
}

impl ActionDraft {
    /// Draft for a newly created entity.
    #[must_use]
    pub fn create(
        actor: Actor,
        entity_type: EntityType,
        entity: EntityRef,
        after: Snapshot,
    ) -> Self {
        Self {
            actor,
            action_type: ActionType::Create,
            entity_type,
            entity,
            before: None,
            after: Some(after),
        }
    }

    /// Draft for a modified entity.
    #[must_use]
    pub fn update(
        actor: Actor,
        entity_type: EntityType,
        entity: EntityRef,
        before: Snapshot,
        after: Snapshot,
    ) -> Self {
        Self {
            actor,
            action_type: ActionType::Update,
            entity_type,
            entity,
            before: Some(before),
            after: Some(after),
        }
    }

    /// Draft for a removed entity.
    #[must_use]
    pub fn delete(
        actor: Actor,
        entity_type: EntityType,
        entity: EntityRef,
        before: Snapshot,
    ) -> Self {
        Self {
            actor,
            action_type: ActionType::Delete,
            entity_type,
            entity,
            before: Some(before),
            after: None,
        }
    }

    /// Checks that the snapshots match the action type.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` if a create carries a before-state,
    /// a delete carries an after-state, an update lacks either, or the
    /// entity reference is incomplete.
    pub fn validate(&self) -> AuditResult<()> {
        match (self.action_type, &self.before, &self.after) {
            (ActionType::Create, None, Some(_))
            | (ActionType::Update, Some(_), Some(_))
            | (ActionType::Delete, Some(_), None) => {}
            (action_type, before, after) => {
                return Err(AuditError::validation(format!(
                    "{action_type} requires {}; got before={}, after={}",
                    match action_type {
                        ActionType::Create => "an after-state only",
                        ActionType::Update => "both before- and after-state",
                        ActionType::Delete => "a before-state only",
                    },
                    before.is_some(),
                    after.is_some()
                )));
            }
        }

        if self.actor.subject_id.trim().is_empty() {
            return Err(AuditError::validation("actor subject id must not be blank"));
        }
        if self.entity.realm_name.trim().is_empty() {
            return Err(AuditError::validation("realm name must not be blank"));
        }
        Ok(())
    }
}

/// Names of fields that differ between two snapshots, sorted.
///
/// A field differs if it is present on one side only or its values differ.
#[must_use]
pub fn diff(before: Option<&Snapshot>, after: Option<&Snapshot>) -> Vec<String> {
    let empty = Snapshot::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);

    before
        .keys()
        .chain(after.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|name| before.get(name) != after.get(name))
        .map(str::to_string)
        .collect()
}

/// Appends change records together with their mirror writes.
pub struct AuditRecorder<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for AuditRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: AuditStore> AuditRecorder<S> {
    /// Creates a recorder.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn prepare(
        &self,
        draft: ActionDraft,
        reverts_action_id: Option<Uuid>,
    ) -> AuditResult<NewAuditAction> {
        draft.validate()?;

        let changed_fields = if draft.action_type == ActionType::Update {
            diff(draft.before.as_ref(), draft.after.as_ref())
        } else {
            Vec::new()
        };

        Ok(NewAuditAction {
            id: Uuid::now_v7(),
            created_at: self.clock.now(),
            actor: draft.actor,
            action_type: draft.action_type,
            entity_type: draft.entity_type,
            entity: draft.entity,
            before: draft.before,
            after: draft.after,
            changed_fields,
            reverts_action_id,
        })
    }

    /// Applies `write` and appends a record for `draft` atomically.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Validation` for a malformed draft. Any store
    /// failure means neither the mirror write nor the record was persisted.
    pub async fn record(
        &self,
        write: MirrorWrite,
        draft: ActionDraft,
    ) -> AuditResult<AuditAction> {
        let action = self.prepare(draft, None)?;
        let action = self.store.commit(write, action).await?;

        tracing::debug!(
            action_id = %action.id,
            sequence = action.sequence,
            action_type = %action.action_type,
            entity_type = %action.entity_type,
            entity_id = %action.entity.entity_id,
            "recorded audit action"
        );
        Ok(action)
    }

    /// Applies a compensating `write`, marks `original` reverted and
    /// appends the compensating record atomically.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Conflict` if `original` was reverted
    /// concurrently.
    pub async fn record_compensation(
        &self,
        write: MirrorWrite,
        original: &AuditAction,
        reason: &str,
        reverted_by: &Actor,
        draft: ActionDraft,
    ) -> AuditResult<AuditAction> {
        let compensation = self.prepare(draft, Some(original.id))?;
        let mark = RevertMark {
            action_id: original.id,
            reverted_at: compensation.created_at,
            reverted_by: reverted_by.subject_id.clone(),
            reason: reason.to_string(),
        };

        Ok(self.store.commit_revert(write, mark, compensation).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kc_storage::{InMemoryStore, MirrorEntity};

    use super::*;
    use crate::clock::SystemClock;

    fn entity() -> EntityRef {
        EntityRef::new(Uuid::now_v7(), "alice", "acme")
    }

    fn recorder(store: &Arc<InMemoryStore>) -> AuditRecorder<InMemoryStore> {
        AuditRecorder::new(Arc::clone(store), Arc::new(SystemClock))
    }

    #[test]
    fn diff_is_symmetric_and_sorted() {
        let before = Snapshot::new()
            .with("email", "a@x")
            .with("enabled", true)
            .with("firstName", "Al");
        let after = Snapshot::new()
            .with("email", "b@x")
            .with("enabled", true)
            .with("lastName", "Liddell");

        assert_eq!(
            diff(Some(&before), Some(&after)),
            ["email", "firstName", "lastName"]
        );
        assert_eq!(
            diff(Some(&after), Some(&before)),
            ["email", "firstName", "lastName"]
        );
        assert!(diff(Some(&before), Some(&before)).is_empty());
    }

    #[test]
    fn draft_shapes_are_validated() {
        let actor = Actor::new("admin");
        let state = Snapshot::new().with("username", "alice");

        let mut create = ActionDraft::create(actor.clone(), EntityType::User, entity(), state.clone());
        assert!(create.validate().is_ok());
        create.before = Some(state.clone());
        assert!(matches!(create.validate(), Err(AuditError::Validation(_))));

        let mut delete = ActionDraft::delete(actor.clone(), EntityType::User, entity(), state.clone());
        assert!(delete.validate().is_ok());
        delete.after = Some(state.clone());
        assert!(delete.validate().is_err());

        let mut update =
            ActionDraft::update(actor, EntityType::User, entity(), state.clone(), state);
        assert!(update.validate().is_ok());
        update.before = None;
        assert!(update.validate().is_err());
    }

    #[tokio::test]
    async fn changed_fields_only_for_updates() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder(&store);
        let entity = entity();
        let mirror = MirrorEntity {
            entity_type: EntityType::User,
            id: entity.entity_id,
            realm_name: "acme".into(),
            idp_id: None,
            name: "alice".into(),
            state: Snapshot::new(),
            updated_at: Utc::now(),
        };

        let created = recorder
            .record(
                MirrorWrite::Upsert(mirror.clone()),
                ActionDraft::create(
                    Actor::new("admin"),
                    EntityType::User,
                    entity.clone(),
                    Snapshot::new().with("email", "a@x"),
                ),
            )
            .await
            .unwrap();
        assert!(created.changed_fields.is_empty());

        let updated = recorder
            .record(
                MirrorWrite::Upsert(mirror),
                ActionDraft::update(
                    Actor::new("admin"),
                    EntityType::User,
                    entity,
                    Snapshot::new().with("email", "a@x"),
                    Snapshot::new().with("email", "b@x"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(updated.changed_fields, ["email"]);
        assert!(updated.sequence > created.sequence);
    }

    #[tokio::test]
    async fn failed_append_rolls_back_mirror_write() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder(&store);
        let entity = entity();
        store.fail_next_commits(1);

        let result = recorder
            .record(
                MirrorWrite::Delete {
                    entity_type: EntityType::User,
                    id: entity.entity_id,
                },
                ActionDraft::delete(
                    Actor::new("admin"),
                    EntityType::User,
                    entity,
                    Snapshot::new().with("username", "alice"),
                ),
            )
            .await;

        assert!(matches!(result, Err(AuditError::Storage(_))));
        assert!(store.actions().await.is_empty());
    }
}
