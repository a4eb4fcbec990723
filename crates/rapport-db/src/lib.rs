//! # rapport-db
//!
//! PostgreSQL persistence for the rapport custom-field engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for types, field definitions, values and
//!   entity type assignments
//! - Schema migrations (behind the `migrations` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use rapport_db::{Database, PoolConfig, SchemaLimits, Validator, FieldKindRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let url = rapport_db::pool::database_url_from_env()?;
//!     let db = Database::connect_with_config(&url, PoolConfig::from_env()).await?;
//!     let engine = db.custom_fields(Validator::new(
//!         FieldKindRegistry::standard(),
//!         SchemaLimits::from_env(),
//!     ));
//!
//!     let (investor, fields) = engine
//!         .create_type_from_template(team_id, "contact.investor")
//!         .await?;
//!     println!("Created {} with {} fields", investor.name, fields.len());
//!     Ok(())
//! }
//! ```
pub mod assignments;
pub mod fields;
pub mod pool;
pub mod types;
pub mod values;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::str::FromStr;
use std::sync::Arc;

// Re-export core types
pub use rapport_core::*;

// Re-export repository implementations
pub use assignments::PgAssignmentRepository;
pub use fields::PgFieldDefinitionRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use types::PgTypeRepository;
pub use values::PgFieldValueRepository;

/// Parse a TEXT column into one of the core enums.
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| Error::Internal(format!("column {}: {}", column, e)))
}

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Team type repository.
    pub types: PgTypeRepository,
    /// Field definition repository.
    pub fields: PgFieldDefinitionRepository,
    /// Field value repository.
    pub values: PgFieldValueRepository,
    /// Entity type assignment repository.
    pub assignments: PgAssignmentRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            types: PgTypeRepository::new(pool.clone()),
            fields: PgFieldDefinitionRepository::new(pool.clone()),
            values: PgFieldValueRepository::new(pool.clone()),
            assignments: PgAssignmentRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// The custom-field engine backed by this database.
    pub fn custom_fields(&self, validator: Validator) -> CustomFields {
        CustomFields::new(
            Arc::new(PgTypeRepository::new(self.pool.clone())),
            Arc::new(PgFieldDefinitionRepository::new(self.pool.clone())),
            Arc::new(PgFieldValueRepository::new(self.pool.clone())),
            Arc::new(PgAssignmentRepository::new(self.pool.clone())),
            validator,
        )
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column() {
        let kind: EntityKind = parse_column("company", "entity_kind").unwrap();
        assert_eq!(kind, EntityKind::Company);
        let field: FieldKind = parse_column("multi_select", "field_kind").unwrap();
        assert_eq!(field, FieldKind::MultiSelect);

        let err = parse_column::<FieldKind>("rich_text", "field_kind").unwrap_err();
        assert!(matches!(err, Error::Internal(ref msg) if msg.contains("field_kind")));
    }
}
