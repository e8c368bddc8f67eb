//! Bearer authentication for the audit API.
//!
//! [`auth_middleware`] validates the `Authorization: Bearer <token>` header
//! through a pluggable [`TokenValidator`] and stores the resulting
//! [`AdminAuth`] in the request extensions. Handlers read it back through the
//! `AdminAuth` extractor and pass it to the [`crate::policy::AccessPolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kc_model::{Actor, EntityType};
use serde::{Deserialize, Serialize};

use crate::error::AdminError;

/// Realm whose administrators may act across all realms.
pub const MASTER_REALM: &str = "master";

// ============================================================================
// Permission Types
// ============================================================================

/// Admin API permissions following Keycloak's role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    /// View realm settings.
    ViewRealm,
    /// Manage realm settings.
    ManageRealm,
    /// View users.
    ViewUsers,
    /// Manage users.
    ManageUsers,
    /// View clients.
    ViewClients,
    /// Manage clients.
    ManageClients,
    /// View roles.
    ViewRoles,
    /// Manage roles.
    ManageRoles,
    /// View groups.
    ViewGroups,
    /// Manage groups.
    ManageGroups,
    /// View identity provider links.
    ViewIdentityProviders,
    /// Manage identity provider links.
    ManageIdentityProviders,
    /// Browse the change log.
    ViewEvents,
    /// Revert logged changes.
    ManageEvents,
    /// Full admin access.
    RealmAdmin,
}

impl Permission {
    /// Returns all permissions implied by this permission.
    #[must_use]
    pub fn implies(&self) -> Vec<Self> {
        match self {
            Self::RealmAdmin => vec![
                Self::ViewRealm,
                Self::ManageRealm,
                Self::ViewUsers,
                Self::ManageUsers,
                Self::ViewClients,
                Self::ManageClients,
                Self::ViewRoles,
                Self::ManageRoles,
                Self::ViewGroups,
                Self::ManageGroups,
                Self::ViewIdentityProviders,
                Self::ManageIdentityProviders,
                Self::ViewEvents,
                Self::ManageEvents,
            ],
            Self::ManageRealm => vec![Self::ViewRealm],
            Self::ManageUsers => vec![Self::ViewUsers],
            Self::ManageClients => vec![Self::ViewClients],
            Self::ManageRoles => vec![Self::ViewRoles],
            Self::ManageGroups => vec![Self::ViewGroups],
            Self::ManageIdentityProviders => vec![Self::ViewIdentityProviders],
            Self::ManageEvents => vec![Self::ViewEvents],
            _ => vec![],
        }
    }

    /// Permission needed to write entities of one kind.
    #[must_use]
    pub const fn manage(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Realm => Self::ManageRealm,
            EntityType::User => Self::ManageUsers,
            EntityType::Client => Self::ManageClients,
            EntityType::Role => Self::ManageRoles,
            EntityType::Group => Self::ManageGroups,
            EntityType::Idp => Self::ManageIdentityProviders,
        }
    }

    /// Maps a Keycloak role name to a permission.
    #[must_use]
    pub fn from_role_name(role: &str) -> Option<Self> {
        match role {
            "realm-admin" | "admin" => Some(Self::RealmAdmin),
            "view-realm" => Some(Self::ViewRealm),
            "manage-realm" => Some(Self::ManageRealm),
            "view-users" => Some(Self::ViewUsers),
            "manage-users" => Some(Self::ManageUsers),
            "view-clients" => Some(Self::ViewClients),
            "manage-clients" => Some(Self::ManageClients),
            "view-roles" => Some(Self::ViewRoles),
            "manage-roles" => Some(Self::ManageRoles),
            "view-groups" => Some(Self::ViewGroups),
            "manage-groups" => Some(Self::ManageGroups),
            "view-identity-providers" => Some(Self::ViewIdentityProviders),
            "manage-identity-providers" => Some(Self::ManageIdentityProviders),
            "view-events" => Some(Self::ViewEvents),
            "manage-events" => Some(Self::ManageEvents),
            _ => None,
        }
    }

    /// Returns the role name for this permission.
    #[must_use]
    pub const fn role_name(&self) -> &'static str {
        match self {
            Self::RealmAdmin => "realm-admin",
            Self::ViewRealm => "view-realm",
            Self::ManageRealm => "manage-realm",
            Self::ViewUsers => "view-users",
            Self::ManageUsers => "manage-users",
            Self::ViewClients => "view-clients",
            Self::ManageClients => "manage-clients",
            Self::ViewRoles => "view-roles",
            Self::ManageRoles => "manage-roles",
            Self::ViewGroups => "view-groups",
            Self::ManageGroups => "manage-groups",
            Self::ViewIdentityProviders => "view-identity-providers",
            Self::ManageIdentityProviders => "manage-identity-providers",
            Self::ViewEvents => "view-events",
            Self::ManageEvents => "manage-events",
        }
    }
}

// ============================================================================
// Authentication Context
// ============================================================================

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Subject id from the token.
    pub subject_id: String,
    /// Username.
    pub username: String,
    /// Email, if the token carries one.
    pub email: Option<String>,
    /// Token issuer.
    pub issuer: Option<String>,
    /// Realm the caller authenticated against.
    pub realm: String,
    /// Granted permissions.
    pub permissions: Vec<Permission>,
}

impl AdminAuth {
    /// Creates a caller with no permissions.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, username: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            username: username.into(),
            email: None,
            issuer: None,
            realm: realm.into(),
            permissions: Vec::new(),
        }
    }

    /// Grants a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Checks if the caller holds a permission, directly or implied.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| *p == permission || p.implies().contains(&permission))
    }

    /// Checks if the caller may act on `realm`.
    ///
    /// Master realm callers reach every realm; others only their own.
    #[must_use]
    pub fn can_access_realm(&self, realm: &str) -> bool {
        self.realm == MASTER_REALM || self.realm == realm
    }

    /// Actor recorded on changes made by this caller.
    #[must_use]
    pub fn actor(&self) -> Actor {
        let mut actor = Actor::new(self.subject_id.clone()).with_display_name(self.username.clone());
        if let Some(email) = &self.email {
            actor = actor.with_email(email.clone());
        }
        if let Some(issuer) = &self.issuer {
            actor = actor.with_issuer(issuer.clone());
        }
        actor
    }
}

// ============================================================================
// Token Validator Trait
// ============================================================================

/// Validates admin bearer tokens.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates a bearer token and returns the caller.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Unauthorized` if the token is unknown, invalid
    /// or expired.
    async fn validate(&self, token: &str) -> Result<AdminAuth, AdminError>;
}

/// Validator backed by a fixed token table.
///
/// Used for service tokens and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, AdminAuth>,
}

impl StaticTokenValidator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, auth: AdminAuth) -> Self {
        self.tokens.insert(token.into(), auth);
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<AdminAuth, AdminError> {
        self.tokens.get(token).cloned().ok_or(AdminError::Unauthorized)
    }
}

// ============================================================================
// Axum Middleware
// ============================================================================

/// Shared state for the authentication middleware.
pub struct AuthState {
    /// Token validator.
    pub validator: Arc<dyn TokenValidator>,
}

impl Clone for AuthState {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
        }
    }
}

impl AuthState {
    /// Creates auth state around a validator.
    pub fn new(validator: impl TokenValidator + 'static) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

/// Validates the bearer token and injects [`AdminAuth`] into the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(&request) else {
        return (
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            "Missing or invalid Authorization header",
        )
            .into_response();
    };

    match state.validator.validate(&token).await {
        Ok(auth) => {
            tracing::debug!(subject_id = %auth.subject_id, realm = %auth.realm, "authenticated admin request");
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(String::from)
}

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AdminError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AdminError::Unauthorized)
    }
}
