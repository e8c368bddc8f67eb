//! `PostgreSQL` implementation of the audit store.

use async_trait::async_trait;
use kc_model::{AuditAction, EntityType, NewAuditAction, Page, PageRequest, RevertMark};
use kc_storage::error::StorageResult;
use kc_storage::{AuditScope, AuditStore, MirrorWrite, StorageError};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::convert::encode_snapshot;
use crate::entities::AuditActionRow;
use crate::error::from_sqlx_error;

/// `PostgreSQL` audit log and mirror store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PostgreSQL` store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn apply_mirror_write(
        conn: &mut PgConnection,
        write: &MirrorWrite,
    ) -> StorageResult<()> {
        match write {
            MirrorWrite::Upsert(entity) => {
                sqlx::query(
                    r"INSERT INTO mirror_entities (
                        entity_type, id, realm_name, idp_id, name, state, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (entity_type, id) DO UPDATE SET
                        realm_name = EXCLUDED.realm_name,
                        idp_id = EXCLUDED.idp_id,
                        name = EXCLUDED.name,
                        state = EXCLUDED.state,
                        updated_at = EXCLUDED.updated_at",
                )
                .bind(entity.entity_type.as_str())
                .bind(entity.id)
                .bind(&entity.realm_name)
                .bind(&entity.idp_id)
                .bind(&entity.name)
                .bind(Json(entity.state.encode()))
                .bind(entity.updated_at)
                .execute(&mut *conn)
                .await
                .map_err(from_sqlx_error)?;
            }
            MirrorWrite::Delete { entity_type, id } => {
                sqlx::query("DELETE FROM mirror_entities WHERE entity_type = $1 AND id = $2")
                    .bind(entity_type.as_str())
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(from_sqlx_error)?;
            }
        }
        Ok(())
    }

    async fn insert_action(
        conn: &mut PgConnection,
        action: &NewAuditAction,
    ) -> StorageResult<AuditAction> {
        let row: AuditActionRow = sqlx::query_as(
            r"INSERT INTO audit_actions (
                id, created_at,
                actor_subject_id, actor_email, actor_display_name, actor_issuer,
                action_type, entity_type,
                entity_id, entity_idp_id, entity_name, realm_name, realm_id,
                before_state, after_state, changed_fields, reverts_action_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *",
        )
        .bind(action.id)
        .bind(action.created_at)
        .bind(&action.actor.subject_id)
        .bind(&action.actor.email)
        .bind(&action.actor.display_name)
        .bind(&action.actor.issuer)
        .bind(action.action_type.as_str())
        .bind(action.entity_type.as_str())
        .bind(action.entity.entity_id)
        .bind(&action.entity.idp_id)
        .bind(&action.entity.name)
        .bind(&action.entity.realm_name)
        .bind(action.entity.realm_id)
        .bind(encode_snapshot(action.before.as_ref()))
        .bind(encode_snapshot(action.after.as_ref()))
        .bind(Json(&action.changed_fields))
        .bind(action.reverts_action_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(from_sqlx_error)?;

        AuditAction::try_from(row)
    }
}

fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &AuditScope) {
    match scope {
        AuditScope::Actor(subject) => {
            builder.push(" WHERE actor_subject_id = ").push_bind(subject.clone());
        }
        AuditScope::Realm(realm) => {
            builder.push(" WHERE realm_name = ").push_bind(realm.clone());
        }
        AuditScope::Global => {}
        AuditScope::Entity {
            entity_type,
            entity_id,
        } => {
            builder
                .push(" WHERE entity_type = ")
                .push_bind(entity_type.as_str())
                .push(" AND entity_id = ")
                .push_bind(*entity_id);
        }
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn get_action(&self, id: Uuid) -> StorageResult<Option<AuditAction>> {
        let row: Option<AuditActionRow> =
            sqlx::query_as("SELECT * FROM audit_actions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(from_sqlx_error)?;

        row.map(AuditAction::try_from).transpose()
    }

    async fn has_later_unreverted(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        sequence: i64,
    ) -> StorageResult<bool> {
        sqlx::query_scalar(
            r"SELECT EXISTS (
                SELECT 1 FROM audit_actions
                WHERE entity_type = $1 AND entity_id = $2
                  AND sequence > $3 AND NOT reverted
            )",
        )
        .bind(entity_type.as_str())
        .bind(entity_id)
        .bind(sequence)
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx_error)
    }

    async fn page_actions(
        &self,
        scope: &AuditScope,
        request: PageRequest,
    ) -> StorageResult<Page<AuditAction>> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx_error)?;

        // count and page must observe the same snapshot
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_actions");
        push_scope(&mut count, scope);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM audit_actions");
        push_scope(&mut select, scope);
        select
            .push(" ORDER BY sequence DESC LIMIT ")
            .push_bind(i64::from(request.size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(request.offset()).unwrap_or(i64::MAX));
        let rows: Vec<AuditActionRow> = select
            .build_query_as()
            .fetch_all(&mut *tx)
            .await
            .map_err(from_sqlx_error)?;

        tx.commit().await.map_err(from_sqlx_error)?;

        let content = rows
            .into_iter()
            .map(AuditAction::try_from)
            .collect::<StorageResult<Vec<_>>>()?;
        let total = u64::try_from(total).unwrap_or_default();

        Ok(Page::new(content, request, total))
    }

    async fn commit(
        &self,
        write: MirrorWrite,
        action: NewAuditAction,
    ) -> StorageResult<AuditAction> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx_error)?;

        Self::apply_mirror_write(&mut *tx, &write).await?;
        let action = Self::insert_action(&mut *tx, &action).await?;

        tx.commit().await.map_err(from_sqlx_error)?;
        Ok(action)
    }

    async fn commit_revert(
        &self,
        write: MirrorWrite,
        mark: RevertMark,
        compensation: NewAuditAction,
    ) -> StorageResult<AuditAction> {
        let mut tx = self.pool.begin().await.map_err(from_sqlx_error)?;

        Self::apply_mirror_write(&mut *tx, &write).await?;

        let marked = sqlx::query(
            r"UPDATE audit_actions SET
                reverted = TRUE, reverted_at = $2, reverted_by = $3, revert_reason = $4
            WHERE id = $1 AND reverted = FALSE
              AND NOT EXISTS (
                SELECT 1 FROM audit_actions later
                WHERE later.entity_type = audit_actions.entity_type
                  AND later.entity_id = audit_actions.entity_id
                  AND later.sequence > audit_actions.sequence
                  AND NOT later.reverted
              )",
        )
        .bind(mark.action_id)
        .bind(mark.reverted_at)
        .bind(&mark.reverted_by)
        .bind(&mark.reason)
        .execute(&mut *tx)
        .await
        .map_err(from_sqlx_error)?;

        if marked.rows_affected() == 0 {
            let reverted: Option<bool> =
                sqlx::query_scalar("SELECT reverted FROM audit_actions WHERE id = $1")
                    .bind(mark.action_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(from_sqlx_error)?;
            tx.rollback().await.map_err(from_sqlx_error)?;

            tracing::debug!(action_id = %mark.action_id, ?reverted, "revert mark lost");
            return Err(match reverted {
                None => StorageError::not_found("AuditAction", mark.action_id),
                Some(true) => {
                    StorageError::conflict(format!("action {} is already reverted", mark.action_id))
                }
                Some(false) => StorageError::conflict(format!(
                    "action {} was superseded by a later change",
                    mark.action_id
                )),
            });
        }

        let action = Self::insert_action(&mut *tx, &compensation).await?;

        tx.commit().await.map_err(from_sqlx_error)?;
        Ok(action)
    }
}
