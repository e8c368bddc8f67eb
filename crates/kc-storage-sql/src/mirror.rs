//! `PostgreSQL` implementation of the mirror store.

use async_trait::async_trait;
use kc_model::EntityType;
use kc_storage::error::StorageResult;
use kc_storage::{MirrorEntity, MirrorStore};
use uuid::Uuid;

use crate::audit::PgStore;
use crate::entities::MirrorEntityRow;
use crate::error::from_sqlx_error;

#[async_trait]
impl MirrorStore for PgStore {
    async fn get_entity(
        &self,
        entity_type: EntityType,
        id: Uuid,
    ) -> StorageResult<Option<MirrorEntity>> {
        let row: Option<MirrorEntityRow> =
            sqlx::query_as("SELECT * FROM mirror_entities WHERE entity_type = $1 AND id = $2")
                .bind(entity_type.as_str())
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .map_err(from_sqlx_error)?;

        row.map(MirrorEntity::try_from).transpose()
    }

    async fn find_by_idp_id(
        &self,
        entity_type: EntityType,
        realm_name: &str,
        idp_id: &str,
    ) -> StorageResult<Option<MirrorEntity>> {
        let row: Option<MirrorEntityRow> = sqlx::query_as(
            "SELECT * FROM mirror_entities WHERE entity_type = $1 AND realm_name = $2 AND idp_id = $3 LIMIT 1",
        )
        .bind(entity_type.as_str())
        .bind(realm_name)
        .bind(idp_id)
        .fetch_optional(self.pool())
        .await
        .map_err(from_sqlx_error)?;

        row.map(MirrorEntity::try_from).transpose()
    }

    async fn list_entities(
        &self,
        entity_type: EntityType,
        realm_name: &str,
    ) -> StorageResult<Vec<MirrorEntity>> {
        let rows: Vec<MirrorEntityRow> = sqlx::query_as(
            "SELECT * FROM mirror_entities WHERE entity_type = $1 AND realm_name = $2 ORDER BY name",
        )
        .bind(entity_type.as_str())
        .bind(realm_name)
        .fetch_all(self.pool())
        .await
        .map_err(from_sqlx_error)?;

        rows.into_iter().map(MirrorEntity::try_from).collect()
    }
}
