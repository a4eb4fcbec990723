//! PostgreSQL implementation of AssignmentRepository.

use async_trait::async_trait;
use uuid::Uuid;

use rapport_core::{AssignmentRepository, EntityKind, Error, Result};
use sqlx::{Pool, Postgres};

/// PostgreSQL implementation of AssignmentRepository.
pub struct PgAssignmentRepository {
    pool: Pool<Postgres>,
}

impl PgAssignmentRepository {
    /// Create a new PgAssignmentRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn type_exists(&self, type_id: Uuid) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM team_type WHERE id = $1)")
            .bind(type_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

#[async_trait]
impl AssignmentRepository for PgAssignmentRepository {
    async fn assign(&self, entity_id: Uuid, kind: EntityKind, type_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO entity_type_assignment (entity_id, entity_kind, type_id, assigned_at)
            SELECT $1, $2, t.id, NOW() FROM team_type t WHERE t.id = $3
            ON CONFLICT (entity_id, type_id) DO NOTHING
            "#,
        )
        .bind(entity_id)
        .bind(kind.as_str())
        .bind(type_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if !self.type_exists(type_id).await? {
            return Err(Error::TypeNotFound(type_id));
        }
        Ok(false)
    }

    async fn unassign(&self, entity_id: Uuid, type_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM entity_type_assignment WHERE entity_id = $1 AND type_id = $2")
                .bind(entity_id)
                .bind(type_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_for_entity(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
        type_ids: &[Uuid],
    ) -> Result<()> {
        let mut wanted: Vec<Uuid> = Vec::with_capacity(type_ids.len());
        for id in type_ids {
            if !wanted.contains(id) {
                wanted.push(*id);
            }
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        if !wanted.is_empty() {
            let found: Vec<Uuid> =
                sqlx::query_scalar("SELECT id FROM team_type WHERE id = ANY($1) FOR KEY SHARE")
                    .bind(&wanted)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
            if let Some(missing) = wanted.iter().find(|id| !found.contains(id)) {
                return Err(Error::TypeNotFound(*missing));
            }
        }

        sqlx::query(
            "DELETE FROM entity_type_assignment WHERE entity_id = $1 AND NOT (type_id = ANY($2))",
        )
        .bind(entity_id)
        .bind(&wanted)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        for type_id in &wanted {
            sqlx::query(
                r#"
                INSERT INTO entity_type_assignment (entity_id, entity_kind, type_id, assigned_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (entity_id, type_id) DO NOTHING
                "#,
            )
            .bind(entity_id)
            .bind(kind.as_str())
            .bind(type_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list_type_ids_for_entity(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
    ) -> Result<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT type_id FROM entity_type_assignment
            WHERE entity_id = $1 AND entity_kind = $2
            ORDER BY assigned_at, type_id
            "#,
        )
        .bind(entity_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entity_type_assignment WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
