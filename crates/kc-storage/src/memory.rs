//! In-memory reference store.
//!
//! Keeps the log and the mirror behind one lock so every write is atomic and
//! every page read sees one consistent state. Used by tests and by the
//! server when no database is configured.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use kc_model::{AuditAction, EntityType, NewAuditAction, Page, PageRequest, RevertMark};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditScope, AuditStore};
use crate::error::{StorageError, StorageResult};
use crate::mirror::{MirrorEntity, MirrorStore, MirrorWrite};

#[derive(Debug, Default)]
struct State {
    // ascending sequence order
    actions: Vec<AuditAction>,
    mirror: HashMap<(EntityType, Uuid), MirrorEntity>,
}

/// In-memory audit log and mirror.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    sequence: AtomicI64,
    injected_failures: AtomicUsize,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` write operations fail with a transaction
    /// error before touching any state.
    pub fn fail_next_commits(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Inserts a mirror row directly, without a log record.
    pub async fn seed_entity(&self, entity: MirrorEntity) {
        self.state
            .write()
            .await
            .mirror
            .insert((entity.entity_type, entity.id), entity);
    }

    /// Returns every record in ascending sequence order.
    pub async fn actions(&self) -> Vec<AuditAction> {
        self.state.read().await.actions.clone()
    }

    fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_injected_failure(&self) -> StorageResult<()> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Transaction(
                "injected commit failure".to_string(),
            ));
        }
        Ok(())
    }

    fn apply(mirror: &mut HashMap<(EntityType, Uuid), MirrorEntity>, write: MirrorWrite) {
        match write {
            MirrorWrite::Upsert(entity) => {
                mirror.insert((entity.entity_type, entity.id), entity);
            }
            MirrorWrite::Delete { entity_type, id } => {
                mirror.remove(&(entity_type, id));
            }
        }
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn get_action(&self, id: Uuid) -> StorageResult<Option<AuditAction>> {
        let state = self.state.read().await;
        Ok(state.actions.iter().find(|a| a.id == id).cloned())
    }

    async fn has_later_unreverted(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        sequence: i64,
    ) -> StorageResult<bool> {
        let state = self.state.read().await;
        Ok(state.actions.iter().any(|a| {
            a.entity_type == entity_type
                && a.entity.entity_id == entity_id
                && a.sequence > sequence
                && !a.revert.reverted
        }))
    }

    async fn page_actions(
        &self,
        scope: &AuditScope,
        request: PageRequest,
    ) -> StorageResult<Page<AuditAction>> {
        let state = self.state.read().await;
        let matching: Vec<&AuditAction> = state
            .actions
            .iter()
            .rev()
            .filter(|a| scope.matches(a))
            .collect();

        let total = matching.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let content = matching
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .cloned()
            .collect();

        Ok(Page::new(content, request, total))
    }

    async fn commit(
        &self,
        write: MirrorWrite,
        action: NewAuditAction,
    ) -> StorageResult<AuditAction> {
        self.take_injected_failure()?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        Self::apply(&mut state.mirror, write);
        let action = action.into_action(self.next_sequence());
        state.actions.push(action.clone());
        Ok(action)
    }

    async fn commit_revert(
        &self,
        write: MirrorWrite,
        mark: RevertMark,
        compensation: NewAuditAction,
    ) -> StorageResult<AuditAction> {
        self.take_injected_failure()?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let index = state
            .actions
            .iter()
            .position(|a| a.id == mark.action_id)
            .ok_or_else(|| StorageError::not_found("AuditAction", mark.action_id))?;

        if state.actions[index].revert.reverted {
            return Err(StorageError::conflict(format!(
                "action {} is already reverted",
                mark.action_id
            )));
        }
        let target = &state.actions[index];
        let superseded = state.actions.iter().any(|a| {
            a.entity_type == target.entity_type
                && a.entity.entity_id == target.entity.entity_id
                && a.sequence > target.sequence
                && !a.revert.reverted
        });
        if superseded {
            return Err(StorageError::conflict(format!(
                "action {} was superseded by a later change",
                mark.action_id
            )));
        }
        if state
            .actions
            .iter()
            .any(|a| a.reverts_action_id == Some(mark.action_id))
        {
            return Err(StorageError::duplicate(
                "AuditAction",
                "reverts_action_id",
                mark.action_id.to_string(),
            ));
        }

        Self::apply(&mut state.mirror, write);
        state.actions[index].revert = mark.annotation();
        let action = compensation.into_action(self.next_sequence());
        state.actions.push(action.clone());
        Ok(action)
    }
}

#[async_trait]
impl MirrorStore for InMemoryStore {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> StorageResult<Option<MirrorEntity>> {
        let state = self.state.read().await;
        Ok(state.mirror.get(&(entity_type, id)).cloned())
    }

    async fn find_by_idp_id(
        &self,
        entity_type: EntityType,
        realm_name: &str,
        idp_id: &str,
    ) -> StorageResult<Option<MirrorEntity>> {
        let state = self.state.read().await;
        Ok(state
            .mirror
            .values()
            .find(|e| {
                e.entity_type == entity_type
                    && e.realm_name == realm_name
                    && e.idp_id.as_deref() == Some(idp_id)
            })
            .cloned())
    }

    async fn list_entities(
        &self,
        entity_type: EntityType,
        realm_name: &str,
    ) -> StorageResult<Vec<MirrorEntity>> {
        let state = self.state.read().await;
        let mut entities: Vec<MirrorEntity> = state
            .mirror
            .values()
            .filter(|e| e.entity_type == entity_type && e.realm_name == realm_name)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }
}
