//! Audit API router and handlers.

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use kc_audit::{AuditBackend, AuditError, UpstreamProvider};
use kc_model::{AuditAction, EntityType, PageRequest};
use uuid::Uuid;

use crate::auth::{auth_middleware, AdminAuth, AuthState};
use crate::dto::{ActionRepresentation, PageParams, PageResponse, RevertRequest, RevertResponse};
use crate::error::{AdminError, AdminResult};
use crate::policy::AuditOperation;
use crate::state::AuditState;

type ActionPage = Json<PageResponse<ActionRepresentation>>;

// ============================================================================
// Listing Handlers
// ============================================================================

/// GET /admin/audit/actions/me - Actions performed by the caller
async fn list_own_actions<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Query(params): Query<PageParams>,
) -> AdminResult<ActionPage>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    state.policy.authorize(&auth, AuditOperation::ViewOwn)?;
    let page = state
        .queries
        .for_actor(&auth.subject_id, PageRequest::from(params))
        .await?;
    Ok(Json(page.into()))
}

/// GET /admin/audit/realms/{realm}/actions - Actions in a realm
async fn list_realm_actions<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Path(realm): Path<String>,
    Query(params): Query<PageParams>,
) -> AdminResult<ActionPage>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    state.policy.authorize(&auth, AuditOperation::ViewRealm(&realm))?;
    let page = state
        .queries
        .for_realm(&realm, PageRequest::from(params))
        .await?;
    Ok(Json(page.into()))
}

/// GET /admin/audit/actions - Every action
async fn list_all_actions<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Query(params): Query<PageParams>,
) -> AdminResult<ActionPage>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    state.policy.authorize(&auth, AuditOperation::ViewGlobal)?;
    let page = state.queries.global(PageRequest::from(params)).await?;
    Ok(Json(page.into()))
}

/// GET /admin/audit/entities/{entityType}/{entityId}/actions - Entity history
async fn list_entity_actions<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
    Query(params): Query<PageParams>,
) -> AdminResult<ActionPage>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    let entity_type: EntityType = entity_type
        .parse()
        .map_err(|_| AdminError::BadRequest(format!("Unknown entity type: {entity_type}")))?;
    state.policy.authorize(&auth, AuditOperation::ViewEntity)?;

    let page = state
        .queries
        .for_entity(entity_type, entity_id, PageRequest::from(params))
        .await?;

    // Callers outside the master realm only see their own realm's history.
    let response: PageResponse<ActionRepresentation> = page.into();
    if response
        .content
        .iter()
        .any(|action| !auth.can_access_realm(&action.realm_name))
    {
        return Err(AdminError::Forbidden(format!(
            "No access to {} {entity_id}",
            entity_type.label()
        )));
    }
    Ok(Json(response))
}

// ============================================================================
// Single Action Handlers
// ============================================================================

async fn load_visible<S, U>(state: &AuditState<S, U>, auth: &AdminAuth, id: Uuid) -> AdminResult<AuditAction>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    let action = state.queries.get(id).await?;
    state.policy.authorize(auth, AuditOperation::ViewAction(&action))?;
    Ok(action)
}

/// GET /admin/audit/actions/{id} - Single action
async fn get_action<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> AdminResult<Json<ActionRepresentation>>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    let action = load_visible(&state, &auth, id).await?;
    Ok(Json(action.into()))
}

/// GET /admin/audit/actions/{id}/can-revert - Whether a revert would be accepted
async fn can_revert<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> AdminResult<Json<bool>>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    load_visible(&state, &auth, id).await?;
    Ok(Json(state.checker.can_revert(id).await?))
}

/// POST /admin/audit/actions/{id}/revert - Revert an action
async fn revert_action<S, U>(
    State(state): State<AuditState<S, U>>,
    auth: AdminAuth,
    Path(id): Path<Uuid>,
    Json(request): Json<RevertRequest>,
) -> AdminResult<Json<RevertResponse>>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    let action = state.queries.get(id).await?;
    state.policy.authorize(&auth, AuditOperation::Revert(&action))?;

    match state.executor.revert(id, &request.reason, auth.actor()).await {
        Ok(compensation) => Ok(Json(RevertResponse::reverted(compensation.id))),
        Err(AuditError::PartialFailure { message }) => Ok(Json(RevertResponse::degraded(message))),
        Err(err) => Err(err.into()),
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Creates the audit API router.
///
/// Every route requires a bearer token validated through `auth`.
///
/// # Routes
///
/// | Method | Path | Description |
/// |--------|------|-------------|
/// | GET | `/admin/audit/actions/me` | Actions performed by the caller |
/// | GET | `/admin/audit/realms/{realm}/actions` | Actions in a realm |
/// | GET | `/admin/audit/actions` | Every action (master realm admins) |
/// | GET | `/admin/audit/entities/{entityType}/{entityId}/actions` | Entity history |
/// | GET | `/admin/audit/actions/{id}` | Single action |
/// | GET | `/admin/audit/actions/{id}/can-revert` | Whether a revert would be accepted |
/// | POST | `/admin/audit/actions/{id}/revert` | Revert an action |
///
/// # Example
///
/// ```ignore
/// let state = AuditState::new(store, upstream, Arc::new(SystemClock));
/// let app = audit_router(AuthState::new(validator)).with_state(state);
/// ```
pub fn audit_router<S, U>(auth: AuthState) -> Router<AuditState<S, U>>
where
    S: AuditBackend,
    U: UpstreamProvider + 'static,
{
    Router::new()
        .route("/admin/audit/actions", get(list_all_actions::<S, U>))
        .route("/admin/audit/actions/me", get(list_own_actions::<S, U>))
        .route("/admin/audit/actions/{id}", get(get_action::<S, U>))
        .route(
            "/admin/audit/actions/{id}/can-revert",
            get(can_revert::<S, U>),
        )
        .route(
            "/admin/audit/actions/{id}/revert",
            post(revert_action::<S, U>),
        )
        .route(
            "/admin/audit/realms/{realm}/actions",
            get(list_realm_actions::<S, U>),
        )
        .route(
            "/admin/audit/entities/{entity_type}/{entity_id}/actions",
            get(list_entity_actions::<S, U>),
        )
        .route_layer(middleware::from_fn_with_state(auth, auth_middleware))
}
