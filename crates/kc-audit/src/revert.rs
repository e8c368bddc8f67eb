//! Revertability rule and the compensating revert protocol.
//!
//! A revert never rewrites history. It writes the inverse change to the
//! identity provider, then in one store transaction applies the inverse to
//! the mirror, flips the original record's revert flag (false to true only)
//! and appends a compensating record pointing back at the original.
//!
//! The provider write comes first. If the local commit then fails for any
//! reason other than losing the revert flag race, the provider and the
//! mirror disagree; this is reported as [`AuditError::PartialFailure`] and
//! logged with `inconsistency = true`. That includes a newer change to the
//! same entity committed while the provider call was in flight: the store
//! refuses the revert mark, but the provider already holds the old state.
//! A later retry re-reads provider state and skips the provider write if it
//! is already in place.

use std::sync::Arc;

use kc_model::{ActionType, Actor, AuditAction, EntityRef, FieldValue, Snapshot};
use kc_storage::{MirrorEntity, MirrorStore, MirrorWrite, StorageError};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuditError, AuditResult};
use crate::recorder::{ActionDraft, AuditRecorder};
use crate::upstream::{UpstreamEntity, UpstreamError, UpstreamProvider};
use crate::AuditBackend;

/// Longest accepted revert reason, in characters.
pub const MAX_REASON_LENGTH: usize = 1000;

/// Checks a revert reason.
///
/// # Errors
///
/// Returns `AuditError::Validation` if the reason is blank or longer than
/// [`MAX_REASON_LENGTH`] characters.
pub fn validate_reason(reason: &str) -> AuditResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AuditError::validation("revert reason must not be blank"));
    }
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(AuditError::validation(format!(
            "revert reason must be at most {MAX_REASON_LENGTH} characters"
        )));
    }
    Ok(reason.to_string())
}

// ============================================================================
// Revertability
// ============================================================================

/// Decides whether a record may be reverted.
pub struct RevertabilityChecker<S> {
    store: Arc<S>,
}

impl<S> Clone for RevertabilityChecker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AuditBackend> RevertabilityChecker<S> {
    /// Creates a checker.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Loads a record.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if the record does not exist.
    pub async fn load(&self, action_id: Uuid) -> AuditResult<AuditAction> {
        self.store
            .get_action(action_id)
            .await?
            .ok_or_else(|| AuditError::not_found("AuditAction", action_id))
    }

    /// Checks if a record may be reverted.
    ///
    /// A record is revertable when it is not reverted yet and no other
    /// un-reverted record on the same entity has a higher sequence.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::NotFound` if the record does not exist.
    pub async fn can_revert(&self, action_id: Uuid) -> AuditResult<bool> {
        let action = self.load(action_id).await?;
        Ok(self.blocker(&action).await?.is_none())
    }

    /// Returns why `action` cannot be reverted, or `None` if it can.
    pub(crate) async fn blocker(&self, action: &AuditAction) -> AuditResult<Option<&'static str>> {
        if action.is_reverted() {
            return Ok(Some("action is already reverted"));
        }
        let superseded = self
            .store
            .has_later_unreverted(action.entity_type, action.entity.entity_id, action.sequence)
            .await?;
        Ok(superseded.then_some("a later change to the same entity has not been reverted"))
    }
}

// ============================================================================
// Compensation
// ============================================================================

/// Provider-side effect of a compensation.
#[derive(Debug)]
enum UpstreamEffect {
    Deleted,
    Updated { idp_id: String },
    Recreated(UpstreamEntity),
}

/// Executes compensating reverts.
///
/// The protocol runs in a detached task: once started, dropping the
/// caller's future does not abort it.
pub struct RevertExecutor<S, U> {
    checker: RevertabilityChecker<S>,
    recorder: AuditRecorder<S>,
    upstream: Arc<U>,
    clock: Arc<dyn Clock>,
}

impl<S, U> Clone for RevertExecutor<S, U> {
    fn clone(&self) -> Self {
        Self {
            checker: self.checker.clone(),
            recorder: self.recorder.clone(),
            upstream: Arc::clone(&self.upstream),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S, U> RevertExecutor<S, U>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    /// Creates an executor.
    pub fn new(store: Arc<S>, upstream: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            checker: RevertabilityChecker::new(Arc::clone(&store)),
            recorder: AuditRecorder::new(store, Arc::clone(&clock)),
            upstream,
            clock,
        }
    }

    /// Reverts a record and returns the compensating record.
    ///
    /// # Errors
    ///
    /// - `Validation` if the reason is blank or too long
    /// - `NotFound` if the record does not exist
    /// - `Conflict` if it is already reverted, superseded, or was reverted
    ///   concurrently, or if a deleted entity's name now belongs to another
    ///   entity
    /// - `Upstream` if the provider write failed; nothing changed locally
    /// - `PartialFailure` if the provider was changed but the local commit
    ///   failed, including when a newer change landed in between
    pub async fn revert(
        &self,
        action_id: Uuid,
        reason: &str,
        reverted_by: Actor,
    ) -> AuditResult<AuditAction> {
        let reason = validate_reason(reason)?;
        let executor = self.clone();

        tokio::spawn(async move { executor.run(action_id, &reason, &reverted_by).await })
            .await
            .map_err(|e| {
                AuditError::Storage(StorageError::Internal(format!("revert task failed: {e}")))
            })?
    }

    async fn run(&self, action_id: Uuid, reason: &str, reverted_by: &Actor) -> AuditResult<AuditAction> {
        let original = self.checker.load(action_id).await?;
        if let Some(blocker) = self.checker.blocker(&original).await? {
            return Err(AuditError::conflict(format!(
                "action {action_id} cannot be reverted: {blocker}"
            )));
        }

        let effect = self.apply_upstream(&original).await?;
        let (write, draft) = self.local_compensation(&original, effect, reverted_by)?;

        match self
            .recorder
            .record_compensation(write, &original, reason, reverted_by, draft)
            .await
        {
            Ok(compensation) => {
                tracing::info!(
                    action_id = %original.id,
                    new_action_id = %compensation.id,
                    entity_type = %original.entity_type,
                    entity_id = %original.entity.entity_id,
                    reverted_by = %reverted_by.subject_id,
                    "action reverted"
                );
                Ok(compensation)
            }
            Err(AuditError::Conflict(message)) => {
                let reverted_elsewhere = self
                    .checker
                    .load(original.id)
                    .await
                    .is_ok_and(|current| current.is_reverted());
                if reverted_elsewhere {
                    tracing::warn!(action_id = %original.id, %message, "revert lost to a concurrent revert");
                    return Err(AuditError::Conflict(message));
                }

                tracing::error!(
                    inconsistency = true,
                    action_id = %original.id,
                    entity_type = %original.entity_type,
                    entity_id = %original.entity.entity_id,
                    %message,
                    "identity provider reverted but a newer change was committed first"
                );
                Err(AuditError::partial_failure(format!(
                    "identity provider reflects the revert of {} but a newer change to the \
                     same entity was committed meanwhile: {message}",
                    original.id
                )))
            }
            Err(err) => {
                tracing::error!(
                    inconsistency = true,
                    action_id = %original.id,
                    entity_type = %original.entity_type,
                    entity_id = %original.entity.entity_id,
                    error = %err,
                    "identity provider reverted but local commit failed"
                );
                Err(AuditError::partial_failure(format!(
                    "identity provider reflects the revert of {} but the local mirror and log \
                     were not updated: {err}",
                    original.id
                )))
            }
        }
    }

    /// Finds the entity upstream by id, or by name if no id is known.
    async fn locate(&self, entity: &EntityRef, original: &AuditAction) -> AuditResult<Option<UpstreamEntity>> {
        let found = match &entity.idp_id {
            Some(idp_id) => {
                self.upstream
                    .get(&entity.realm_name, original.entity_type, idp_id)
                    .await?
            }
            None => {
                self.upstream
                    .find_by_name(&entity.realm_name, original.entity_type, &entity.name)
                    .await?
            }
        };
        Ok(found)
    }

    async fn apply_upstream(&self, original: &AuditAction) -> AuditResult<UpstreamEffect> {
        let entity = &original.entity;
        let realm = entity.realm_name.as_str();
        let entity_type = original.entity_type;

        match original.action_type {
            ActionType::Create => {
                let Some(current) = self.locate(entity, original).await? else {
                    tracing::info!(action_id = %original.id, "entity already absent upstream, skipping delete");
                    return Ok(UpstreamEffect::Deleted);
                };
                match self.upstream.delete(realm, entity_type, &current.idp_id).await {
                    Ok(()) | Err(UpstreamError::NotFound { .. }) => Ok(UpstreamEffect::Deleted),
                    Err(err) => Err(err.into()),
                }
            }
            ActionType::Update => {
                let before = required(original.before.as_ref(), original, "before")?;
                let current = self.locate(entity, original).await?.ok_or_else(|| {
                    AuditError::conflict(format!(
                        "{} '{}' no longer exists in the identity provider",
                        entity_type.label(),
                        entity.name
                    ))
                })?;

                if reflects(&current.state, before, &original.changed_fields) {
                    tracing::info!(action_id = %original.id, "previous state already upstream, skipping update");
                } else {
                    let payload = restore_payload(before, &original.changed_fields);
                    self.upstream
                        .update(realm, entity_type, &current.idp_id, &payload)
                        .await?;
                }
                Ok(UpstreamEffect::Updated {
                    idp_id: current.idp_id,
                })
            }
            ActionType::Delete => {
                let before = required(original.before.as_ref(), original, "before")?;
                if let Some(existing) = self
                    .upstream
                    .find_by_name(realm, entity_type, &entity.name)
                    .await?
                {
                    // only a recreation of this entity counts, not a newer namesake
                    let owner = self
                        .checker
                        .store
                        .find_by_idp_id(entity_type, realm, &existing.idp_id)
                        .await?;
                    if owner.is_some_and(|owner| owner.id != entity.entity_id) {
                        return Err(AuditError::conflict(format!(
                            "{} name '{}' is now taken by another entity",
                            entity_type.label(),
                            entity.name
                        )));
                    }
                    tracing::info!(action_id = %original.id, idp_id = %existing.idp_id, "entity already recreated upstream, skipping create");
                    return Ok(UpstreamEffect::Recreated(existing));
                }

                let mut payload = before.clone();
                payload.remove("id");
                let created = self.upstream.create(realm, entity_type, &payload).await?;
                Ok(UpstreamEffect::Recreated(created))
            }
        }
    }

    fn local_compensation(
        &self,
        original: &AuditAction,
        effect: UpstreamEffect,
        reverted_by: &Actor,
    ) -> AuditResult<(MirrorWrite, ActionDraft)> {
        let entity_type = original.entity_type;
        let actor = reverted_by.clone();

        let compensation = match effect {
            UpstreamEffect::Deleted => (
                MirrorWrite::Delete {
                    entity_type,
                    id: original.entity.entity_id,
                },
                ActionDraft::delete(
                    actor,
                    entity_type,
                    original.entity.clone(),
                    required(original.after.as_ref(), original, "after")?.clone(),
                ),
            ),
            UpstreamEffect::Updated { idp_id } => {
                let before = required(original.before.as_ref(), original, "before")?;
                let after = required(original.after.as_ref(), original, "after")?;
                let mut entity = original.entity.clone();
                entity.idp_id = Some(idp_id);
                (
                    MirrorWrite::Upsert(self.mirror_entity(original, &entity, before.clone())),
                    ActionDraft::update(actor, entity_type, entity, after.clone(), before.clone()),
                )
            }
            UpstreamEffect::Recreated(created) => {
                let mut entity = original.entity.clone();
                entity.idp_id = Some(created.idp_id);
                (
                    MirrorWrite::Upsert(self.mirror_entity(original, &entity, created.state.clone())),
                    ActionDraft::create(actor, entity_type, entity, created.state),
                )
            }
        };
        Ok(compensation)
    }

    fn mirror_entity(&self, original: &AuditAction, entity: &EntityRef, state: Snapshot) -> MirrorEntity {
        MirrorEntity {
            entity_type: original.entity_type,
            id: entity.entity_id,
            realm_name: entity.realm_name.clone(),
            idp_id: entity.idp_id.clone(),
            name: entity.name.clone(),
            state,
            updated_at: self.clock.now(),
        }
    }
}

fn required<'a>(
    snapshot: Option<&'a Snapshot>,
    action: &AuditAction,
    side: &str,
) -> AuditResult<&'a Snapshot> {
    snapshot.ok_or_else(|| {
        AuditError::Storage(StorageError::InvalidData(format!(
            "{} action {} has no {side}-state",
            action.action_type, action.id
        )))
    })
}

fn value_of<'a>(snapshot: &'a Snapshot, field: &str) -> &'a FieldValue {
    snapshot.get(field).unwrap_or(&FieldValue::Null)
}

/// Checks if a value is absent in effect. Providers may answer a cleared
/// field with an empty value instead of dropping it.
fn is_cleared(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(text) => text.is_empty(),
        FieldValue::List(items) => items.is_empty(),
        FieldValue::Map(fields) => fields.is_empty(),
        FieldValue::Bool(_) | FieldValue::Integer(_) | FieldValue::Float(_) => false,
    }
}

/// Checks if `current` already holds `target` for every changed field.
/// Absent, null and empty values are treated alike.
fn reflects(current: &Snapshot, target: &Snapshot, changed_fields: &[String]) -> bool {
    changed_fields.iter().all(|field| {
        let (current, target) = (value_of(current, field), value_of(target, field));
        current == target || (is_cleared(current) && is_cleared(target))
    })
}

/// Builds the update that restores `before` for the changed fields.
///
/// Fields the original change introduced are cleared with an explicit null.
fn restore_payload(before: &Snapshot, changed_fields: &[String]) -> Snapshot {
    changed_fields
        .iter()
        .map(|field| (field.clone(), value_of(before, field).clone()))
        .collect()
}
