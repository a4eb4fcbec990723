//! PostgreSQL implementation of FieldDefinitionRepository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use rapport_core::{Error, FieldDefinition, FieldDefinitionRepository, FieldError, Result};

use crate::parse_column;

const FIELD_COLUMNS: &str = r#"
    id, type_id, name, field_kind, description, is_required, default_value,
    options, display_order, created_at, updated_at
"#;

/// PostgreSQL implementation of FieldDefinitionRepository.
pub struct PgFieldDefinitionRepository {
    pool: Pool<Postgres>,
}

impl PgFieldDefinitionRepository {
    /// Create a new PgFieldDefinitionRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_field(row: &PgRow) -> Result<FieldDefinition> {
        Ok(FieldDefinition {
            id: row.get("id"),
            type_id: row.get("type_id"),
            name: row.get("name"),
            field_kind: parse_column(row.get("field_kind"), "field_kind")?,
            description: row.get("description"),
            is_required: row.get("is_required"),
            default_value: row.get("default_value"),
            options: row.get("options"),
            display_order: row.get("display_order"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl FieldDefinitionRepository for PgFieldDefinitionRepository {
    async fn insert(&self, def: FieldDefinition) -> Result<FieldDefinition> {
        // Selecting from team_type makes a missing type insert nothing.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO field_definition (
                id, type_id, name, field_kind, description, is_required,
                default_value, options, display_order, created_at, updated_at
            )
            SELECT $1, t.id, $3, $4, $5, $6, $7, $8,
                   COALESCE((SELECT MAX(display_order) + 1 FROM field_definition WHERE type_id = t.id), 0),
                   $9, $10
            FROM team_type t
            WHERE t.id = $2
            RETURNING {}
            "#,
            FIELD_COLUMNS
        ))
        .bind(def.id)
        .bind(def.type_id)
        .bind(&def.name)
        .bind(def.field_kind.as_str())
        .bind(&def.description)
        .bind(def.is_required)
        .bind(&def.default_value)
        .bind(&def.options)
        .bind(def.created_at)
        .bind(def.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::TypeNotFound(def.type_id))?;

        Self::row_to_field(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FieldDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM field_definition WHERE id = $1",
            FIELD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::row_to_field).transpose()
    }

    async fn list_for_type(&self, type_id: Uuid) -> Result<Vec<FieldDefinition>> {
        self.list_for_types(&[type_id]).await
    }

    async fn list_for_types(&self, type_ids: &[Uuid]) -> Result<Vec<FieldDefinition>> {
        if type_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM field_definition
            WHERE type_id = ANY($1)
            ORDER BY type_id, display_order, created_at, id
            "#,
            FIELD_COLUMNS
        ))
        .bind(type_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_field).collect()
    }

    async fn update(&self, def: &FieldDefinition) -> Result<FieldDefinition> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE field_definition
            SET name = $2, field_kind = $3, description = $4, is_required = $5,
                default_value = $6, options = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FIELD_COLUMNS
        ))
        .bind(def.id)
        .bind(&def.name)
        .bind(def.field_kind.as_str())
        .bind(&def.description)
        .bind(def.is_required)
        .bind(&def.default_value)
        .bind(&def.options)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::FieldNotFound(def.id))?;

        Self::row_to_field(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let removed = sqlx::query("DELETE FROM field_value WHERE field_definition_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        let result = sqlx::query("DELETE FROM field_definition WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::FieldNotFound(id));
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(removed)
    }

    async fn append_option_if_absent(
        &self,
        id: Uuid,
        option: &str,
        max_options: usize,
    ) -> Result<(FieldDefinition, bool)> {
        // A concurrent append holding the row lock makes this statement
        // re-check the predicate against the committed options.
        let row = sqlx::query(&format!(
            r#"
            UPDATE field_definition
            SET options = array_append(options, $2), updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(options)) AND cardinality(options) < $3
            RETURNING {}
            "#,
            FIELD_COLUMNS
        ))
        .bind(id)
        .bind(option)
        .bind(i32::try_from(max_options).unwrap_or(i32::MAX))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok((Self::row_to_field(&row)?, true));
        }

        let def = self.get(id).await?.ok_or(Error::FieldNotFound(id))?;
        if !def.options.iter().any(|o| o == option) {
            return Err(Error::validation(
                "option",
                FieldError::too_many_options(max_options),
            ));
        }
        debug!(
            subsystem = "database",
            component = "fields",
            op = "append_option",
            field_id = %id,
            "Option already present"
        );
        Ok((def, false))
    }

    async fn reorder(&self, type_id: Uuid, ordered_ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let current: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM field_definition
            WHERE type_id = $1
            ORDER BY display_order, created_at, id
            FOR UPDATE
            "#,
        )
        .bind(type_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if let Some(stray) = ordered_ids.iter().find(|id| !current.contains(id)) {
            return Err(Error::InvalidInput(format!(
                "field {} does not belong to type {}",
                stray, type_id
            )));
        }

        let order: Vec<Uuid> = ordered_ids
            .iter()
            .copied()
            .chain(current.into_iter().filter(|id| !ordered_ids.contains(id)))
            .collect();

        sqlx::query(
            r#"
            UPDATE field_definition f
            SET display_order = (o.position - 1)::INTEGER, updated_at = NOW()
            FROM UNNEST($1::UUID[]) WITH ORDINALITY AS o(id, position)
            WHERE f.id = o.id
            "#,
        )
        .bind(&order)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
