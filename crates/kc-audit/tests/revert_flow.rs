//! End-to-end revert scenarios against the in-memory store and provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use kc_audit::{
    AuditError, AuditQueryService, Clock, EntityMutationService, InMemoryUpstream, ManualClock,
    RevertExecutor, RevertabilityChecker, SystemClock, UpstreamEntity, UpstreamError,
    UpstreamProvider,
};
use kc_model::{ActionType, Actor, AuditAction, EntityType, PageRequest, Snapshot};
use kc_storage::{InMemoryStore, MirrorStore};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryStore>,
    upstream: Arc<InMemoryUpstream>,
    mutations: EntityMutationService<InMemoryStore, InMemoryUpstream>,
    executor: RevertExecutor<InMemoryStore, InMemoryUpstream>,
    checker: RevertabilityChecker<InMemoryStore>,
    queries: AuditQueryService<InMemoryStore>,
}

impl Harness {
    fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let upstream = Arc::new(InMemoryUpstream::new());
        Self {
            mutations: EntityMutationService::new(
                Arc::clone(&store),
                Arc::clone(&upstream),
                clock.clone(),
            ),
            executor: RevertExecutor::new(Arc::clone(&store), Arc::clone(&upstream), clock),
            checker: RevertabilityChecker::new(Arc::clone(&store)),
            queries: AuditQueryService::new(Arc::clone(&store)),
            store,
            upstream,
        }
    }

    async fn create_user(&self, email: &str) -> AuditAction {
        self.mutations
            .create(
                admin(),
                "acme",
                EntityType::User,
                Snapshot::new().with("username", "alice").with("email", email),
            )
            .await
            .unwrap()
    }

    async fn set_email(&self, created: &AuditAction, email: &str) -> AuditAction {
        self.mutations
            .update(
                admin(),
                EntityType::User,
                created.entity.entity_id,
                Snapshot::new().with("email", email),
            )
            .await
            .unwrap()
    }

    /// Executor whose provider runs `hook` on the next update.
    fn hooked_executor(&self, hook: OnUpdate) -> RevertExecutor<InMemoryStore, HookedUpstream> {
        let upstream = HookedUpstream {
            inner: Arc::clone(&self.upstream),
            on_update: Mutex::new(Some(hook)),
        };
        RevertExecutor::new(
            Arc::clone(&self.store),
            Arc::new(upstream),
            Arc::new(SystemClock),
        )
    }

    fn side_channel(&self) -> EntityMutationService<InMemoryStore, InMemoryUpstream> {
        EntityMutationService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.upstream),
            Arc::new(SystemClock),
        )
    }

    async fn upstream_email(&self, action: &AuditAction) -> Option<String> {
        let idp_id = action.entity.idp_id.as_deref().unwrap();
        self.upstream
            .state("acme", EntityType::User, idp_id)
            .await
            .and_then(|state| state.text("email").map(str::to_string))
    }

    async fn mirror_email(&self, action: &AuditAction) -> Option<String> {
        self.store
            .get_entity(EntityType::User, action.entity.entity_id)
            .await
            .unwrap()
            .and_then(|entity| entity.state.text("email").map(str::to_string))
    }
}

/// Behavior injected into the next provider update.
enum OnUpdate {
    /// Another admin changes the email first, then the update proceeds.
    Interleave {
        mutations: EntityMutationService<InMemoryStore, InMemoryUpstream>,
        entity_id: Uuid,
    },
    /// Signals `started`, then waits for `release` before writing.
    Pause {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// In-memory provider with a one-shot hook on update.
struct HookedUpstream {
    inner: Arc<InMemoryUpstream>,
    on_update: Mutex<Option<OnUpdate>>,
}

#[async_trait]
impl UpstreamProvider for HookedUpstream {
    async fn get(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> Result<Option<UpstreamEntity>, UpstreamError> {
        self.inner.get(realm, entity_type, idp_id).await
    }

    async fn find_by_name(
        &self,
        realm: &str,
        entity_type: EntityType,
        name: &str,
    ) -> Result<Option<UpstreamEntity>, UpstreamError> {
        self.inner.find_by_name(realm, entity_type, name).await
    }

    async fn create(
        &self,
        realm: &str,
        entity_type: EntityType,
        state: &Snapshot,
    ) -> Result<UpstreamEntity, UpstreamError> {
        self.inner.create(realm, entity_type, state).await
    }

    async fn update(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
        state: &Snapshot,
    ) -> Result<(), UpstreamError> {
        let hook = self.on_update.lock().await.take();
        match hook {
            Some(OnUpdate::Interleave {
                mutations,
                entity_id,
            }) => {
                mutations
                    .update(
                        Actor::new("other-admin"),
                        entity_type,
                        entity_id,
                        Snapshot::new().with("email", "newest@acme.test"),
                    )
                    .await
                    .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
            }
            Some(OnUpdate::Pause { started, release }) => {
                started.notify_one();
                release.notified().await;
            }
            None => {}
        }
        self.inner.update(realm, entity_type, idp_id, state).await
    }

    async fn delete(
        &self,
        realm: &str,
        entity_type: EntityType,
        idp_id: &str,
    ) -> Result<(), UpstreamError> {
        self.inner.delete(realm, entity_type, idp_id).await
    }

    async fn list(
        &self,
        realm: &str,
        entity_type: EntityType,
    ) -> Result<Vec<UpstreamEntity>, UpstreamError> {
        self.inner.list(realm, entity_type).await
    }
}

fn admin() -> Actor {
    Actor::new("admin-1").with_email("admin@acme.test")
}

fn operator() -> Actor {
    Actor::new("operator-7")
}

#[tokio::test]
async fn reverting_an_update_restores_previous_state() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;

    assert!(h.checker.can_revert(updated.id).await.unwrap());
    let compensation = h
        .executor
        .revert(updated.id, "wrong address", operator())
        .await
        .unwrap();

    assert_eq!(h.upstream_email(&created).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("old@acme.test"));

    assert_eq!(compensation.action_type, ActionType::Update);
    assert_eq!(compensation.reverts_action_id, Some(updated.id));
    assert_eq!(compensation.actor, operator());
    assert_eq!(compensation.after, updated.before);
    assert_eq!(compensation.before, updated.after);
    assert_eq!(compensation.changed_fields, ["email"]);
    assert!(compensation.sequence > updated.sequence);

    let original = h.queries.get(updated.id).await.unwrap();
    assert!(original.revert.reverted);
    assert_eq!(original.revert.reverted_by.as_deref(), Some("operator-7"));
    assert_eq!(original.revert.reason.as_deref(), Some("wrong address"));
    assert!(!h.checker.can_revert(updated.id).await.unwrap());
}

#[tokio::test]
async fn second_revert_is_a_conflict() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;

    h.executor.revert(updated.id, "first", operator()).await.unwrap();
    let again = h.executor.revert(updated.id, "second", operator()).await;

    assert!(matches!(again, Err(AuditError::Conflict(_))));
    let compensations = h
        .store
        .actions()
        .await
        .into_iter()
        .filter(|a| a.reverts_action_id == Some(updated.id))
        .count();
    assert_eq!(compensations, 1);
}

#[tokio::test]
async fn concurrent_reverts_succeed_exactly_once() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;

    let attempts = (0..8).map(|i| h.executor.revert(updated.id, "race", Actor::new(format!("op-{i}"))));
    let results = join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AuditError::Conflict(_))));
    assert_eq!(h.store.actions().await.len(), 3);
}

#[tokio::test]
async fn later_change_blocks_revert() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;

    assert!(!h.checker.can_revert(created.id).await.unwrap());
    let result = h.executor.revert(created.id, "undo create", operator()).await;
    assert!(matches!(result, Err(AuditError::Conflict(_))));

    // once the update is reverted the create is the latest un-reverted change
    h.executor.revert(updated.id, "undo update", operator()).await.unwrap();
    assert!(!h.checker.can_revert(created.id).await.unwrap());
}

#[tokio::test]
async fn reverting_a_create_deletes_the_entity() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;

    let compensation = h.executor.revert(created.id, "not needed", operator()).await.unwrap();

    assert_eq!(compensation.action_type, ActionType::Delete);
    assert_eq!(compensation.before, created.after);
    assert!(compensation.after.is_none());
    assert!(h.upstream_email(&created).await.is_none());
    assert!(h.mirror_email(&created).await.is_none());
}

#[tokio::test]
async fn reverting_a_delete_recreates_the_entity() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let deleted = h
        .mutations
        .delete(admin(), EntityType::User, created.entity.entity_id)
        .await
        .unwrap();

    let compensation = h.executor.revert(deleted.id, "deleted by mistake", operator()).await.unwrap();

    assert_eq!(compensation.action_type, ActionType::Create);
    assert_eq!(compensation.entity.entity_id, created.entity.entity_id);
    assert_ne!(compensation.entity.idp_id, created.entity.idp_id);
    assert_eq!(h.upstream_email(&compensation).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("old@acme.test"));
}

#[tokio::test]
async fn upstream_failure_leaves_local_state_untouched() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;
    h.upstream.fail_next_writes(1);

    let result = h.executor.revert(updated.id, "try", operator()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AuditError::Upstream(_)));
    assert!(err.is_retryable());
    assert_eq!(h.store.actions().await.len(), 2);
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("new@acme.test"));
    assert!(h.checker.can_revert(updated.id).await.unwrap());
}

#[tokio::test]
async fn partial_failure_retry_does_not_repeat_upstream_write() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;
    h.store.fail_next_commits(1);

    let writes_before = h.upstream.write_count();
    let first = h.executor.revert(updated.id, "rollback", operator()).await;

    assert!(first.as_ref().is_err_and(AuditError::is_partial_failure));
    assert_eq!(h.upstream.write_count(), writes_before + 1);
    assert_eq!(h.upstream_email(&created).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("new@acme.test"));

    let retry = h.executor.revert(updated.id, "rollback", operator()).await.unwrap();

    assert_eq!(h.upstream.write_count(), writes_before + 1);
    assert_eq!(retry.reverts_action_id, Some(updated.id));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("old@acme.test"));
}

#[tokio::test]
async fn invalid_reason_is_rejected_before_any_write() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let writes = h.upstream.write_count();

    let blank = h.executor.revert(created.id, "  ", operator()).await;
    let long = h.executor.revert(created.id, &"x".repeat(1001), operator()).await;

    assert!(matches!(blank, Err(AuditError::Validation(_))));
    assert!(matches!(long, Err(AuditError::Validation(_))));
    assert_eq!(h.upstream.write_count(), writes);
}

#[tokio::test]
async fn unknown_action_is_not_found() {
    let h = Harness::new();
    let missing = uuid::Uuid::now_v7();

    assert!(matches!(
        h.checker.can_revert(missing).await,
        Err(AuditError::NotFound { .. })
    ));
    assert!(matches!(
        h.executor.revert(missing, "gone", operator()).await,
        Err(AuditError::NotFound { .. })
    ));
}

#[tokio::test]
async fn entity_history_is_newest_first() {
    let h = Harness::new();
    let created = h.create_user("a@acme.test").await;
    h.set_email(&created, "b@acme.test").await;
    let last = h.set_email(&created, "c@acme.test").await;

    let page = h
        .queries
        .for_entity(EntityType::User, created.entity.entity_id, PageRequest::new(0, 2))
        .await
        .unwrap();

    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.content[0].id, last.id);

    let mine = h.queries.for_actor("admin-1", PageRequest::default()).await.unwrap();
    assert_eq!(mine.total_elements, 3);
    assert!(h.queries.for_realm("other", PageRequest::default()).await.unwrap().content.is_empty());

    let oversized = h.queries.global(PageRequest::new(0, 500)).await;
    assert!(matches!(oversized, Err(AuditError::Validation(_))));
}

#[tokio::test]
async fn delete_revert_refuses_a_newer_namesake() {
    let h = Harness::new();
    let first = h.create_user("first@acme.test").await;
    let deleted = h
        .mutations
        .delete(admin(), EntityType::User, first.entity.entity_id)
        .await
        .unwrap();
    let second = h.create_user("second@acme.test").await;
    assert_ne!(second.entity.entity_id, first.entity.entity_id);

    let writes = h.upstream.write_count();
    let result = h.executor.revert(deleted.id, "deleted by mistake", operator()).await;

    assert!(matches!(result, Err(AuditError::Conflict(_))));
    assert_eq!(h.upstream.write_count(), writes);
    assert!(
        h.store
            .get_entity(EntityType::User, first.entity.entity_id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(h.mirror_email(&second).await.as_deref(), Some("second@acme.test"));
    assert!(!h.queries.get(deleted.id).await.unwrap().revert.reverted);
}

#[tokio::test]
async fn delete_revert_retry_adopts_its_own_recreation() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let deleted = h
        .mutations
        .delete(admin(), EntityType::User, created.entity.entity_id)
        .await
        .unwrap();
    h.store.fail_next_commits(1);

    let writes = h.upstream.write_count();
    let first = h.executor.revert(deleted.id, "deleted by mistake", operator()).await;
    assert!(first.as_ref().is_err_and(AuditError::is_partial_failure));
    assert_eq!(h.upstream.write_count(), writes + 1);

    let retry = h
        .executor
        .revert(deleted.id, "deleted by mistake", operator())
        .await
        .unwrap();

    assert_eq!(h.upstream.write_count(), writes + 1);
    assert_eq!(retry.action_type, ActionType::Create);
    assert_eq!(h.upstream_email(&retry).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("old@acme.test"));
}

#[tokio::test]
async fn change_committed_during_provider_write_is_kept() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;
    let executor = h.hooked_executor(OnUpdate::Interleave {
        mutations: h.side_channel(),
        entity_id: created.entity.entity_id,
    });

    let result = executor.revert(updated.id, "rollback", operator()).await;

    assert!(result.as_ref().is_err_and(AuditError::is_partial_failure));
    assert!(!h.queries.get(updated.id).await.unwrap().revert.reverted);

    let actions = h.store.actions().await;
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|a| a.reverts_action_id.is_none()));
    let newest = actions.last().unwrap();
    assert_eq!(newest.actor.subject_id, "other-admin");
    assert!(h.checker.can_revert(newest.id).await.unwrap());

    // provider holds the reverted value, the mirror the newer change
    assert_eq!(h.upstream_email(&created).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("newest@acme.test"));
}

#[tokio::test]
async fn dropped_caller_does_not_abort_revert() {
    let h = Harness::new();
    let created = h.create_user("old@acme.test").await;
    let updated = h.set_email(&created, "new@acme.test").await;
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let executor = h.hooked_executor(OnUpdate::Pause {
        started: Arc::clone(&started),
        release: Arc::clone(&release),
    });

    let revert = executor.revert(updated.id, "rollback", operator());
    tokio::select! {
        _ = revert => panic!("revert finished while the provider write was held"),
        () = started.notified() => {}
    }
    release.notify_one();

    let mut reverted = false;
    for _ in 0..100 {
        if h.queries.get(updated.id).await.unwrap().revert.reverted {
            reverted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(reverted);
    assert!(
        h.store
            .actions()
            .await
            .iter()
            .any(|a| a.reverts_action_id == Some(updated.id))
    );
    assert_eq!(h.upstream_email(&created).await.as_deref(), Some("old@acme.test"));
    assert_eq!(h.mirror_email(&created).await.as_deref(), Some("old@acme.test"));
}

#[tokio::test]
async fn timestamps_come_from_the_injected_clock() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let h = Harness::with_clock(clock.clone());

    let created = h.create_user("old@acme.test").await;
    clock.advance(chrono::Duration::minutes(5));
    let updated = h.set_email(&created, "new@acme.test").await;
    clock.advance(chrono::Duration::minutes(5));
    let compensation = h.executor.revert(updated.id, "rollback", operator()).await.unwrap();

    let reverted_at = start + chrono::Duration::minutes(10);
    assert_eq!(created.created_at, start);
    assert_eq!(updated.created_at, start + chrono::Duration::minutes(5));
    assert_eq!(compensation.created_at, reverted_at);
    assert_eq!(
        h.queries.get(updated.id).await.unwrap().revert.reverted_at,
        Some(reverted_at)
    );
}
