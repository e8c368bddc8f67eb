//! Conversion between database rows and domain models.

use kc_model::{
    ActionType, Actor, AuditAction, EntityRef, EntityType, ModelError, RevertAnnotation, Snapshot,
};
use kc_storage::{MirrorEntity, StorageError};
use sqlx::types::Json;

use crate::entities::{AuditActionRow, MirrorEntityRow};

fn invalid(err: ModelError) -> StorageError {
    StorageError::InvalidData(err.to_string())
}

fn decode_snapshot(value: Option<Json<serde_json::Value>>) -> Result<Option<Snapshot>, StorageError> {
    value
        .map(|Json(v)| Snapshot::decode(&v))
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Encodes an optional snapshot into its JSONB envelope.
pub fn encode_snapshot(snapshot: Option<&Snapshot>) -> Option<Json<serde_json::Value>> {
    snapshot.map(|s| Json(s.encode()))
}

impl TryFrom<AuditActionRow> for AuditAction {
    type Error = StorageError;

    fn try_from(row: AuditActionRow) -> Result<Self, Self::Error> {
        let action_type: ActionType = row.action_type.parse().map_err(invalid)?;
        let entity_type: EntityType = row.entity_type.parse().map_err(invalid)?;

        Ok(Self {
            id: row.id,
            sequence: row.sequence,
            created_at: row.created_at,
            actor: Actor {
                subject_id: row.actor_subject_id,
                email: row.actor_email,
                display_name: row.actor_display_name,
                issuer: row.actor_issuer,
            },
            action_type,
            entity_type,
            entity: EntityRef {
                entity_id: row.entity_id,
                idp_id: row.entity_idp_id,
                name: row.entity_name,
                realm_name: row.realm_name,
                realm_id: row.realm_id,
            },
            before: decode_snapshot(row.before_state)?,
            after: decode_snapshot(row.after_state)?,
            changed_fields: row.changed_fields.0,
            revert: RevertAnnotation {
                reverted: row.reverted,
                reverted_at: row.reverted_at,
                reverted_by: row.reverted_by,
                reason: row.revert_reason,
            },
            reverts_action_id: row.reverts_action_id,
        })
    }
}

impl TryFrom<MirrorEntityRow> for MirrorEntity {
    type Error = StorageError;

    fn try_from(row: MirrorEntityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entity_type: row.entity_type.parse().map_err(invalid)?,
            id: row.id,
            realm_name: row.realm_name,
            idp_id: row.idp_id,
            name: row.name,
            state: Snapshot::decode(&row.state.0)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            updated_at: row.updated_at,
        })
    }
}
