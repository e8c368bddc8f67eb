//! `PgStore` against a real PostgreSQL instance.

use chrono::Utc;
use futures::future::join_all;
use kc_integration_tests::TestEnv;
use kc_model::{
    ActionType, Actor, EntityRef, EntityType, NewAuditAction, PageRequest, RevertMark, Snapshot,
};
use kc_storage::{AuditScope, AuditStore, MirrorEntity, MirrorStore, MirrorWrite, StorageError};
use uuid::Uuid;

fn entity(id: Uuid, name: &str, realm: &str) -> MirrorEntity {
    MirrorEntity {
        entity_type: EntityType::User,
        id,
        realm_name: realm.to_string(),
        idp_id: Some(format!("idp-{name}")),
        name: name.to_string(),
        state: Snapshot::new()
            .with("username", name)
            .with("enabled", true),
        updated_at: Utc::now(),
    }
}

fn draft(
    entity_id: Uuid,
    name: &str,
    realm: &str,
    action_type: ActionType,
    actor: &str,
) -> NewAuditAction {
    NewAuditAction {
        id: Uuid::now_v7(),
        created_at: Utc::now(),
        actor: Actor::new(actor),
        action_type,
        entity_type: EntityType::User,
        entity: EntityRef::new(entity_id, name, realm),
        before: None,
        after: Some(Snapshot::new().with("username", name)),
        changed_fields: Vec::new(),
        reverts_action_id: None,
    }
}

fn mark(action_id: Uuid) -> RevertMark {
    RevertMark {
        action_id,
        reverted_at: Utc::now(),
        reverted_by: "admin".to_string(),
        reason: "mistake".to_string(),
    }
}

#[tokio::test]
async fn commit_persists_record_and_mirror() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();

    let mut action = draft(id, "alice", "acme", ActionType::Create, "admin");
    action.changed_fields = vec!["enabled".to_string(), "username".to_string()];
    let committed = env
        .store
        .commit(MirrorWrite::Upsert(entity(id, "alice", "acme")), action.clone())
        .await?;

    assert_eq!(committed.id, action.id);
    assert!(committed.sequence > 0);
    assert!(!committed.revert.reverted);

    let loaded = env.store.get_action(action.id).await?.expect("record stored");
    assert_eq!(loaded, committed);
    assert_eq!(loaded.after, action.after);
    assert_eq!(loaded.changed_fields, action.changed_fields);

    let mirrored = env
        .store
        .get_entity(EntityType::User, id)
        .await?
        .expect("mirror row stored");
    assert_eq!(mirrored.name, "alice");
    assert_eq!(mirrored.state.flag("enabled"), Some(true));
    Ok(())
}

#[tokio::test]
async fn pages_are_newest_first_and_scoped() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    for (i, realm) in ["acme", "acme", "acme", "globex"].into_iter().enumerate() {
        let id = Uuid::now_v7();
        let name = format!("user{i}");
        env.store
            .commit(
                MirrorWrite::Upsert(entity(id, &name, realm)),
                draft(id, &name, realm, ActionType::Create, if i == 0 { "bob" } else { "admin" }),
            )
            .await?;
    }

    let realm = env
        .store
        .page_actions(&AuditScope::Realm("acme".into()), PageRequest::new(0, 2))
        .await?;
    assert_eq!(realm.total_elements, 3);
    assert_eq!(realm.total_pages, 2);
    assert_eq!(realm.content.len(), 2);
    assert!(realm.content[0].sequence > realm.content[1].sequence);

    let second = env
        .store
        .page_actions(&AuditScope::Realm("acme".into()), PageRequest::new(1, 2))
        .await?;
    assert_eq!(second.content.len(), 1);
    assert_eq!(second.content[0].entity.name, "user0");

    let mine = env
        .store
        .page_actions(&AuditScope::Actor("bob".into()), PageRequest::new(0, 20))
        .await?;
    assert_eq!(mine.total_elements, 1);

    let all = env
        .store
        .page_actions(&AuditScope::Global, PageRequest::new(0, 20))
        .await?;
    assert_eq!(all.total_elements, 4);
    Ok(())
}

#[tokio::test]
async fn later_unreverted_tracks_entity_history() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();

    let created = env
        .store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Create, "admin"),
        )
        .await?;
    assert!(
        !env.store
            .has_later_unreverted(EntityType::User, id, created.sequence)
            .await?
    );

    let updated = env
        .store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Update, "admin"),
        )
        .await?;
    assert!(
        env.store
            .has_later_unreverted(EntityType::User, id, created.sequence)
            .await?
    );

    let history = env
        .store
        .page_actions(
            &AuditScope::Entity {
                entity_type: EntityType::User,
                entity_id: id,
            },
            PageRequest::new(0, 20),
        )
        .await?;
    assert_eq!(
        history.content.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![updated.id, created.id]
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_reverts_commit_exactly_once() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();
    let original = env
        .store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Create, "admin"),
        )
        .await?;

    let attempts = (0..4).map(|_| {
        let store = env.store.clone();
        let mut compensation = draft(id, "alice", "acme", ActionType::Delete, "admin");
        compensation.reverts_action_id = Some(original.id);
        async move {
            store
                .commit_revert(
                    MirrorWrite::Delete {
                        entity_type: EntityType::User,
                        id,
                    },
                    mark(original.id),
                    compensation,
                )
                .await
        }
    });
    let results = join_all(attempts).await;

    let committed: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(committed.len(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StorageError::Conflict(_)))
    );

    let reverted = env.store.get_action(original.id).await?.expect("original kept");
    assert!(reverted.revert.reverted);
    assert_eq!(reverted.revert.reason.as_deref(), Some("mistake"));
    assert!(env.store.get_entity(EntityType::User, id).await?.is_none());

    let all = env
        .store
        .page_actions(&AuditScope::Global, PageRequest::new(0, 20))
        .await?;
    assert_eq!(all.total_elements, 2);
    Ok(())
}

#[tokio::test]
async fn revert_of_unknown_record_is_not_found() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();
    let missing = Uuid::now_v7();

    let result = env
        .store
        .commit_revert(
            MirrorWrite::Delete {
                entity_type: EntityType::User,
                id,
            },
            mark(missing),
            draft(id, "alice", "acme", ActionType::Delete, "admin"),
        )
        .await;

    assert!(matches!(result, Err(StorageError::NotFound { .. })));
    let all = env
        .store
        .page_actions(&AuditScope::Global, PageRequest::new(0, 20))
        .await?;
    assert_eq!(all.total_elements, 0);
    Ok(())
}

#[tokio::test]
async fn mirror_lists_by_realm_in_name_order() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    for (name, realm) in [("carol", "acme"), ("alice", "acme"), ("bob", "globex")] {
        let id = Uuid::now_v7();
        env.store
            .commit(
                MirrorWrite::Upsert(entity(id, name, realm)),
                draft(id, name, realm, ActionType::Create, "admin"),
            )
            .await?;
    }

    let names: Vec<String> = env
        .store
        .list_entities(EntityType::User, "acme")
        .await?
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["alice", "carol"]);
    assert!(env.store.list_entities(EntityType::Group, "acme").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn revert_mark_refused_once_superseded() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();

    let original = env
        .store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Update, "admin"),
        )
        .await?;
    env.store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Update, "other-admin"),
        )
        .await?;

    let mut compensation = draft(id, "alice", "acme", ActionType::Update, "admin");
    compensation.reverts_action_id = Some(original.id);
    let result = env
        .store
        .commit_revert(
            MirrorWrite::Delete {
                entity_type: EntityType::User,
                id,
            },
            mark(original.id),
            compensation,
        )
        .await;

    assert!(matches!(result, Err(StorageError::Conflict(_))));
    let stored = env.store.get_action(original.id).await?.expect("original kept");
    assert!(!stored.revert.reverted);
    assert!(env.store.get_entity(EntityType::User, id).await?.is_some());
    let all = env
        .store
        .page_actions(&AuditScope::Global, PageRequest::new(0, 20))
        .await?;
    assert_eq!(all.total_elements, 2);
    Ok(())
}

#[tokio::test]
async fn mirror_lookup_by_provider_id() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let id = Uuid::now_v7();
    env.store
        .commit(
            MirrorWrite::Upsert(entity(id, "alice", "acme")),
            draft(id, "alice", "acme", ActionType::Create, "admin"),
        )
        .await?;

    let found = env
        .store
        .find_by_idp_id(EntityType::User, "acme", "idp-alice")
        .await?;
    assert_eq!(found.map(|e| e.id), Some(id));
    assert!(
        env.store
            .find_by_idp_id(EntityType::User, "globex", "idp-alice")
            .await?
            .is_none()
    );
    Ok(())
}
