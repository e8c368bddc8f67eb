//! Database row types for `SQLx`.
//!
//! These types map directly to database rows and are converted
//! to/from domain models in [`crate::convert`].

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Database row for `audit_actions`.
#[derive(Debug, Clone, FromRow)]
pub struct AuditActionRow {
    pub id: Uuid,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
    pub actor_subject_id: String,
    pub actor_email: Option<String>,
    pub actor_display_name: Option<String>,
    pub actor_issuer: Option<String>,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub entity_idp_id: Option<String>,
    pub entity_name: String,
    pub realm_name: String,
    pub realm_id: Option<Uuid>,
    pub before_state: Option<Json<serde_json::Value>>,
    pub after_state: Option<Json<serde_json::Value>>,
    pub changed_fields: Json<Vec<String>>,
    pub reverted: bool,
    pub reverted_at: Option<DateTime<Utc>>,
    pub reverted_by: Option<String>,
    pub revert_reason: Option<String>,
    pub reverts_action_id: Option<Uuid>,
}

/// Database row for `mirror_entities`.
#[derive(Debug, Clone, FromRow)]
pub struct MirrorEntityRow {
    pub entity_type: String,
    pub id: Uuid,
    pub realm_name: String,
    pub idp_id: Option<String>,
    pub name: String,
    pub state: Json<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}
