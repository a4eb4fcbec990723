//! PostgreSQL implementation of TypeRepository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use rapport_core::{CascadeSummary, EntityKind, Error, Result, TeamType, TypeRepository};

use crate::parse_column;

const TYPE_COLUMNS: &str = r#"
    t.id, t.team_id, t.entity_kind, t.name, t.description, t.icon, t.color,
    t.is_active, t.source_template_id, t.created_at, t.updated_at,
    (SELECT COUNT(*) FROM entity_type_assignment a WHERE a.type_id = t.id) AS usage_count
"#;

/// PostgreSQL implementation of TypeRepository.
pub struct PgTypeRepository {
    pool: Pool<Postgres>,
}

impl PgTypeRepository {
    /// Create a new PgTypeRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_type(row: &PgRow) -> Result<TeamType> {
        Ok(TeamType {
            id: row.get("id"),
            team_id: row.get("team_id"),
            entity_kind: parse_column(row.get("entity_kind"), "entity_kind")?,
            name: row.get("name"),
            description: row.get("description"),
            icon: row.get("icon"),
            color: row.get("color"),
            is_active: row.get("is_active"),
            usage_count: row.get("usage_count"),
            source_template_id: row.get("source_template_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl TypeRepository for PgTypeRepository {
    async fn insert(&self, ty: TeamType) -> Result<TeamType> {
        sqlx::query(
            r#"
            INSERT INTO team_type (
                id, team_id, entity_kind, name, description, icon, color,
                is_active, source_template_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(ty.id)
        .bind(ty.team_id)
        .bind(ty.entity_kind.as_str())
        .bind(&ty.name)
        .bind(&ty.description)
        .bind(&ty.icon)
        .bind(&ty.color)
        .bind(ty.is_active)
        .bind(&ty.source_template_id)
        .bind(ty.created_at)
        .bind(ty.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.get(ty.id).await?.ok_or(Error::TypeNotFound(ty.id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<TeamType>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM team_type t WHERE t.id = $1",
            TYPE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::row_to_type).transpose()
    }

    async fn list_for_team(
        &self,
        team_id: Uuid,
        kind: Option<EntityKind>,
        include_inactive: bool,
    ) -> Result<Vec<TeamType>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM team_type t
            WHERE t.team_id = $1
              AND ($2::TEXT IS NULL OR t.entity_kind = $2)
              AND ($3 OR t.is_active)
            ORDER BY t.created_at, t.id
            "#,
            TYPE_COLUMNS
        ))
        .bind(team_id)
        .bind(kind.map(|k| k.as_str()))
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_type).collect()
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> Result<Vec<TeamType>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM team_type t WHERE t.id = ANY($1) ORDER BY t.created_at, t.id",
            TYPE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_type).collect()
    }

    async fn update(&self, ty: &TeamType) -> Result<TeamType> {
        let result = sqlx::query(
            r#"
            UPDATE team_type
            SET name = $2, description = $3, icon = $4, color = $5,
                is_active = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(ty.id)
        .bind(&ty.name)
        .bind(&ty.description)
        .bind(&ty.icon)
        .bind(&ty.color)
        .bind(ty.is_active)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::TypeNotFound(ty.id));
        }
        self.get(ty.id).await?.ok_or(Error::TypeNotFound(ty.id))
    }

    async fn usage_count(&self, id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM entity_type_assignment WHERE type_id = t.id) AS usage_count
            FROM team_type t
            WHERE t.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::TypeNotFound(id))?;

        Ok(row.get("usage_count"))
    }

    async fn delete_if_unused(&self, id: Uuid) -> Result<CascadeSummary> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // The row lock conflicts with the key-share lock a concurrent
        // assignment insert takes, so usage cannot change until commit.
        let row = sqlx::query(
            r#"
            SELECT t.id, t.team_id, t.entity_kind, t.name, t.description, t.icon, t.color,
                   t.is_active, t.source_template_id, t.created_at, t.updated_at,
                   0::BIGINT AS usage_count
            FROM team_type t
            WHERE t.id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::TypeNotFound(id))?;
        let ty = Self::row_to_type(&row)?;

        let usage: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM entity_type_assignment WHERE type_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if usage > 0 {
            return Err(Error::Dependency(ty.in_use_message(usage)));
        }

        let values_removed = sqlx::query(
            r#"
            DELETE FROM field_value v
            USING field_definition d
            WHERE v.field_definition_id = d.id AND d.type_id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let fields_removed = sqlx::query("DELETE FROM field_definition WHERE type_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        sqlx::query("DELETE FROM team_type WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "types",
            op = "delete_if_unused",
            type_id = %id,
            fields_removed,
            values_removed,
            "Type row deleted"
        );
        Ok(CascadeSummary {
            fields_removed,
            values_removed,
        })
    }
}
