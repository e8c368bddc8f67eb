//! In-memory identity provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kc_model::{EntityType, Snapshot};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    UpstreamEntity, UpstreamError, UpstreamProvider, UpstreamResult, is_name_keyed, name_key,
};

type Key = (String, EntityType, String);

/// Identity provider double that keeps entities in memory.
///
/// Updates merge fields the way the Keycloak admin API does. Counts
/// successful writes so callers can check that a retry did not repeat one.
#[derive(Debug, Default)]
pub struct InMemoryUpstream {
    entities: RwLock<HashMap<Key, Snapshot>>,
    writes: AtomicUsize,
    injected_failures: AtomicUsize,
}

impl InMemoryUpstream {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entity directly, bypassing write accounting.
    pub async fn seed(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
        state: Snapshot,
    ) {
        self.entities
            .write()
            .await
            .insert((realm.to_string(), entity_type, idp_id.to_string()), state);
    }

    /// Returns the stored representation of an entity.
    pub async fn state(&self, realm: &str, entity_type: EntityType, idp_id: &str) -> Option<Snapshot> {
        self.entities
            .read()
            .await
            .get(&(realm.to_string(), entity_type, idp_id.to_string()))
            .cloned()
    }

    /// Number of successful create, update and delete calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes the next `count` write calls fail as unavailable.
    pub fn fail_next_writes(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> UpstreamResult<()> {
        let injected = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(UpstreamError::Unavailable(
                "injected provider failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UpstreamProvider for InMemoryUpstream {
    async fn get(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>> {
        Ok(self
            .state(realm, entity_type, idp_id)
            .await
            .map(|state| UpstreamEntity {
                idp_id: idp_id.to_string(),
                state,
            }))
    }

    async fn find_by_name(
        &self,
        realm: &str,
        entity_type: EntityType,
        name: &str,
    ) -> UpstreamResult<Option<UpstreamEntity>> {
        let entities = self.entities.read().await;
        Ok(entities
            .iter()
            .find(|((r, t, _), state)| {
                r == realm && *t == entity_type && state.text(name_key(entity_type)) == Some(name)
            })
            .map(|((_, _, idp_id), state)| UpstreamEntity {
                idp_id: idp_id.clone(),
                state: state.clone(),
            }))
    }

    async fn create(
        &self,
        realm: &str,
        entity_type: EntityType,
        state: &Snapshot,
    ) -> UpstreamResult<UpstreamEntity> {
        self.take_injected_failure()?;

        let name = state
            .text(name_key(entity_type))
            .ok_or_else(|| UpstreamError::Rejected {
                status: 400,
                message: format!("missing '{}'", name_key(entity_type)),
            })?
            .to_string();

        let mut entities = self.entities.write().await;
        let taken = entities.iter().any(|((r, t, _), existing)| {
            r == realm && *t == entity_type && existing.text(name_key(entity_type)) == Some(name.as_str())
        });
        if taken {
            return Err(UpstreamError::Conflict(format!(
                "{} '{name}' already exists",
                entity_type.label()
            )));
        }

        let mut stored = state.clone();
        let idp_id = if is_name_keyed(entity_type) {
            name
        } else {
            let id = Uuid::new_v4().to_string();
            stored.insert("id", id.clone());
            id
        };

        entities.insert(
            (realm.to_string(), entity_type, idp_id.clone()),
            stored.clone(),
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(UpstreamEntity {
            idp_id,
            state: stored,
        })
    }

    async fn update(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
        state: &Snapshot,
    ) -> UpstreamResult<()> {
        self.take_injected_failure()?;

        let mut entities = self.entities.write().await;
        let current = entities
            .get_mut(&(realm.to_string(), entity_type, idp_id.to_string()))
            .ok_or_else(|| UpstreamError::not_found(entity_type, idp_id))?;

        for (name, value) in state.fields() {
            current.insert(name, value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> UpstreamResult<()> {
        self.take_injected_failure()?;

        self.entities
            .write()
            .await
            .remove(&(realm.to_string(), entity_type, idp_id.to_string()))
            .ok_or_else(|| UpstreamError::not_found(entity_type, idp_id))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(
        &self,
        realm: &str,
        entity_type: EntityType,
    ) -> UpstreamResult<Vec<UpstreamEntity>> {
        let entities = self.entities.read().await;
        let mut listed: Vec<UpstreamEntity> = entities
            .iter()
            .filter(|((r, t, _), _)| r == realm && *t == entity_type)
            .map(|((_, _, idp_id), state)| UpstreamEntity {
                idp_id: idp_id.clone(),
                state: state.clone(),
            })
            .collect();
        listed.sort_by(|a, b| a.idp_id.cmp(&b.idp_id));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_assigns_id_and_rejects_duplicates() {
        let upstream = InMemoryUpstream::new();
        let state = Snapshot::new().with("username", "alice");

        let created = upstream
            .create("acme", EntityType::User, &state)
            .await
            .unwrap();
        assert_eq!(created.state.text("id"), Some(created.idp_id.as_str()));

        let err = upstream
            .create("acme", EntityType::User, &state)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Conflict(_)));
        assert_eq!(upstream.write_count(), 1);
    }

    #[tokio::test]
    async fn roles_are_keyed_by_name() {
        let upstream = InMemoryUpstream::new();
        let created = upstream
            .create("acme", EntityType::Role, &Snapshot::new().with("name", "auditor"))
            .await
            .unwrap();

        assert_eq!(created.idp_id, "auditor");
        assert!(
            upstream
                .get("acme", EntityType::Role, "auditor")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let upstream = InMemoryUpstream::new();
        upstream
            .seed(
                "acme",
                EntityType::User,
                "u1",
                Snapshot::new().with("username", "alice").with("email", "a@x"),
            )
            .await;

        upstream
            .update(
                "acme",
                EntityType::User,
                "u1",
                &Snapshot::new().with("email", "b@x"),
            )
            .await
            .unwrap();

        let state = upstream.state("acme", EntityType::User, "u1").await.unwrap();
        assert_eq!(state.text("username"), Some("alice"));
        assert_eq!(state.text("email"), Some("b@x"));
    }

    #[tokio::test]
    async fn injected_failure_skips_write() {
        let upstream = InMemoryUpstream::new();
        upstream.fail_next_writes(1);

        let err = upstream
            .create("acme", EntityType::Group, &Snapshot::new().with("name", "ops"))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(upstream.write_count(), 0);
        assert!(upstream.list("acme", EntityType::Group).await.unwrap().is_empty());
    }
}
