//! Change log DTOs.

use chrono::{DateTime, Utc};
use kc_model::{
    ActionType, AuditAction, EntityType, Page, PageRequest, Snapshot, DEFAULT_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A change record as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRepresentation {
    /// Record id.
    pub id: Uuid,
    /// Ordering key.
    pub sequence: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Actor subject id.
    pub actor_subject_id: String,
    /// Actor email at action time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_email: Option<String>,
    /// Actor display name at action time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_display_name: Option<String>,
    /// Kind of mutation.
    pub action_type: ActionType,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Local entity id.
    pub entity_id: Uuid,
    /// Identity provider id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_idp_id: Option<String>,
    /// Entity name.
    pub entity_name: String,
    /// Realm name.
    pub realm_name: String,
    /// State before the change.
    #[serde(default)]
    pub before: Option<Snapshot>,
    /// State after the change.
    #[serde(default)]
    pub after: Option<Snapshot>,
    /// Fields the change touched.
    #[serde(default)]
    pub changed_fields: Vec<String>,
    /// Whether the change was reverted.
    pub reverted: bool,
    /// When it was reverted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_at: Option<DateTime<Utc>>,
    /// Who reverted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverted_by: Option<String>,
    /// Why it was reverted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    /// Record this one undoes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverts_action_id: Option<Uuid>,
}

impl From<AuditAction> for ActionRepresentation {
    fn from(action: AuditAction) -> Self {
        Self {
            id: action.id,
            sequence: action.sequence,
            created_at: action.created_at,
            actor_subject_id: action.actor.subject_id,
            actor_email: action.actor.email,
            actor_display_name: action.actor.display_name,
            action_type: action.action_type,
            entity_type: action.entity_type,
            entity_id: action.entity.entity_id,
            entity_idp_id: action.entity.idp_id,
            entity_name: action.entity.name,
            realm_name: action.entity.realm_name,
            before: action.before,
            after: action.after,
            changed_fields: action.changed_fields,
            reverted: action.revert.reverted,
            reverted_at: action.revert.reverted_at,
            reverted_by: action.revert.reverted_by,
            revert_reason: action.revert.reason,
            reverts_action_id: action.reverts_action_id,
        }
    }
}

/// `page` and `size` query parameters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageParams {
    /// Zero-based page index.
    pub page: Option<u32>,
    /// Page size.
    pub size: Option<u32>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        Self::new(
            params.page.unwrap_or(0),
            params.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    /// Items on this page.
    pub content: Vec<T>,
    /// Page index.
    pub page: u32,
    /// Requested page size.
    pub size: u32,
    /// Items across all pages.
    pub total_elements: u64,
    /// Number of pages.
    pub total_pages: u64,
}

impl<T, U: Into<T>> From<Page<U>> for PageResponse<T> {
    fn from(page: Page<U>) -> Self {
        Self {
            content: page.content.into_iter().map(Into::into).collect(),
            page: page.page,
            size: page.size,
            total_elements: page.total_elements,
            total_pages: page.total_pages,
        }
    }
}

/// Body of a revert request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    /// Why the change is being undone.
    pub reason: String,
}

/// Outcome of a revert request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertResponse {
    /// True when the revert fully committed.
    pub success: bool,
    /// True when the identity provider was changed but local state was not.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    /// Outcome description.
    pub message: String,
    /// Id of the compensating record.
    pub new_action_id: Option<Uuid>,
}

impl RevertResponse {
    /// Successful revert.
    #[must_use]
    pub fn reverted(new_action_id: Uuid) -> Self {
        Self {
            success: true,
            degraded: false,
            message: "Action reverted".to_string(),
            new_action_id: Some(new_action_id),
        }
    }

    /// Provider changed, local commit failed.
    #[must_use]
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            success: false,
            degraded: true,
            message: message.into(),
            new_action_id: None,
        }
    }
}
