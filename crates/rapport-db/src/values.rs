//! PostgreSQL implementation of FieldValueRepository.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use rapport_core::{Error, FieldValue, FieldValueRepository, Result};

/// PostgreSQL implementation of FieldValueRepository.
pub struct PgFieldValueRepository {
    pool: Pool<Postgres>,
}

impl PgFieldValueRepository {
    /// Create a new PgFieldValueRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FieldValueRepository for PgFieldValueRepository {
    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<FieldValue>> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_id, field_definition_id, payload, updated_at
            FROM field_value
            WHERE entity_id = $1
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| FieldValue {
                id: row.get("id"),
                entity_id: row.get("entity_id"),
                field_definition_id: row.get("field_definition_id"),
                payload: row.get("payload"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn replace_for_entity(
        &self,
        entity_id: Uuid,
        scope: &[Uuid],
        values: Vec<FieldValue>,
    ) -> Result<()> {
        if let Some(stray) = values
            .iter()
            .find(|v| !scope.contains(&v.field_definition_id))
        {
            return Err(Error::InvalidInput(format!(
                "value for field {} is outside the replaced scope",
                stray.field_definition_id
            )));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let definition_ids: Vec<Uuid> = values.iter().map(|v| v.field_definition_id).collect();
        if !definition_ids.is_empty() {
            // Lock the definitions so a concurrent delete cannot slip in
            // between this check and the inserts.
            let found: HashSet<Uuid> = sqlx::query_scalar(
                "SELECT id FROM field_definition WHERE id = ANY($1) FOR SHARE",
            )
            .bind(&definition_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(Error::Database)?
            .into_iter()
            .collect();
            if let Some(missing) = definition_ids.iter().find(|id| !found.contains(*id)) {
                return Err(Error::FieldNotFound(*missing));
            }
        }

        let removed = sqlx::query(
            "DELETE FROM field_value WHERE entity_id = $1 AND field_definition_id = ANY($2)",
        )
        .bind(entity_id)
        .bind(scope)
        .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        for value in &values {
            sqlx::query(
                r#"
                INSERT INTO field_value (id, entity_id, field_definition_id, payload, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(value.id)
            .bind(entity_id)
            .bind(value.field_definition_id)
            .bind(&value.payload)
            .bind(value.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "values",
            op = "replace_for_entity",
            entity_id = %entity_id,
            removed,
            value_count = values.len(),
            "Entity value set replaced"
        );
        Ok(())
    }

    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM field_value WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
