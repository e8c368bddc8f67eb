//! Audit API over HTTP with PostgreSQL persistence.

use kc_admin_api::{ActionRepresentation, PageResponse, RevertResponse};
use kc_integration_tests::{TestEnv, ADMIN_TOKEN};
use kc_model::{ActionType, Actor, EntityType, Snapshot};
use kc_server::SERVICE_SUBJECT;
use kc_storage::MirrorStore;
use reqwest::StatusCode;
use serde_json::json;

fn service_actor() -> Actor {
    Actor::new(SERVICE_SUBJECT)
}

#[tokio::test]
async fn health_endpoints() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let server = env.serve().await?;

    let health = server.client.get(server.url("/health")).send().await?;
    assert_eq!(health.status(), StatusCode::OK);
    let body: serde_json::Value = health.json().await?;
    assert_eq!(body["status"], "healthy");

    let ready = server.client.get(server.url("/health/ready")).send().await?;
    assert_eq!(ready.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn audit_requires_valid_token() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let server = env.serve().await?;

    let anonymous = server
        .client
        .get(server.url("/admin/audit/actions/me"))
        .send()
        .await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = server
        .client
        .get(server.url("/admin/audit/actions/me"))
        .bearer_auth("not-the-token")
        .send()
        .await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn update_revert_round_trip() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let server = env.serve().await?;
    let mutations = env.mutations();

    let created = mutations
        .create(
            service_actor(),
            "acme",
            EntityType::User,
            Snapshot::new()
                .with("username", "alice")
                .with("email", "alice@old.example"),
        )
        .await?;
    let updated = mutations
        .update(
            service_actor(),
            EntityType::User,
            created.entity.entity_id,
            Snapshot::new().with("email", "alice@new.example"),
        )
        .await?;

    let page: PageResponse<ActionRepresentation> = server
        .client
        .get(server.url("/admin/audit/realms/acme/actions"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(page.total_elements, 2);
    assert_eq!(page.content[0].id, updated.id);
    assert_eq!(page.content[0].changed_fields, vec!["email".to_string()]);

    let can_revert: bool = server
        .client
        .get(server.url(&format!("/admin/audit/actions/{}/can-revert", updated.id)))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert!(can_revert);

    let revert_url = server.url(&format!("/admin/audit/actions/{}/revert", updated.id));
    let response = server
        .client
        .post(&revert_url)
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "reason": "wrong address" }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: RevertResponse = response.json().await?;
    assert!(outcome.success);
    let compensation_id = outcome.new_action_id.expect("compensating record id");

    let idp_id = created.entity.idp_id.as_deref().expect("provider id");
    let upstream = env
        .upstream
        .state("acme", EntityType::User, idp_id)
        .await
        .expect("user still exists upstream");
    assert_eq!(upstream.text("email"), Some("alice@old.example"));

    let mirrored = env
        .store
        .get_entity(EntityType::User, created.entity.entity_id)
        .await?
        .expect("mirror row kept");
    assert_eq!(mirrored.state.text("email"), Some("alice@old.example"));

    let compensation: ActionRepresentation = server
        .client
        .get(server.url(&format!("/admin/audit/actions/{compensation_id}")))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(compensation.action_type, ActionType::Update);
    assert_eq!(compensation.reverts_action_id, Some(updated.id));

    let original: ActionRepresentation = server
        .client
        .get(server.url(&format!("/admin/audit/actions/{}", updated.id)))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert!(original.reverted);
    assert_eq!(original.revert_reason.as_deref(), Some("wrong address"));
    assert_eq!(original.reverted_by.as_deref(), Some(SERVICE_SUBJECT));

    let again = server
        .client
        .post(&revert_url)
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "reason": "wrong address" }))
        .send()
        .await?;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn delete_revert_recreates_entity() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let server = env.serve().await?;
    let mutations = env.mutations();

    let created = mutations
        .create(
            service_actor(),
            "acme",
            EntityType::Group,
            Snapshot::new().with("name", "admins"),
        )
        .await?;
    let deleted = mutations
        .delete(service_actor(), EntityType::Group, created.entity.entity_id)
        .await?;
    assert!(
        env.store
            .get_entity(EntityType::Group, created.entity.entity_id)
            .await?
            .is_none()
    );

    let outcome: RevertResponse = server
        .client
        .post(server.url(&format!("/admin/audit/actions/{}/revert", deleted.id)))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "reason": "deleted by accident" }))
        .send()
        .await?
        .json()
        .await?;
    assert!(outcome.success);

    let restored = env
        .store
        .get_entity(EntityType::Group, created.entity.entity_id)
        .await?
        .expect("group mirrored again");
    assert_eq!(restored.name, "admins");
    let new_idp_id = restored.idp_id.expect("provider assigned an id");
    assert_ne!(Some(new_idp_id.as_str()), created.entity.idp_id.as_deref());
    assert!(
        env.upstream
            .state("acme", EntityType::Group, &new_idp_id)
            .await
            .is_some()
    );

    let create_blocked: bool = server
        .client
        .get(server.url(&format!("/admin/audit/actions/{}/can-revert", created.id)))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await?
        .json()
        .await?;
    assert!(!create_blocked);
    Ok(())
}

#[tokio::test]
async fn blank_reason_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let server = env.serve().await?;

    let created = env
        .mutations()
        .create(
            service_actor(),
            "acme",
            EntityType::User,
            Snapshot::new().with("username", "bob"),
        )
        .await?;

    let response = server
        .client
        .post(server.url(&format!("/admin/audit/actions/{}/revert", created.id)))
        .bearer_auth(ADMIN_TOKEN)
        .json(&json!({ "reason": "   " }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let idp_id = created.entity.idp_id.as_deref().expect("provider id");
    assert!(
        env.upstream
            .state("acme", EntityType::User, idp_id)
            .await
            .is_some()
    );
    Ok(())
}
