//! Repository traits for the custom-field engine.
//!
//! These traits are the persistence contract. Concrete backends (PostgreSQL
//! in `rapport-db`, [`crate::memory::InMemoryStore`] for tests and embedding)
//! must make every method atomic on its own.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TYPE REPOSITORY
// =============================================================================

/// Storage for tenant-defined types.
///
/// `usage_count` on returned records is derived from the current assignments.
#[async_trait]
pub trait TypeRepository: Send + Sync {
    /// Persist a new type.
    async fn insert(&self, ty: TeamType) -> Result<TeamType>;

    /// Fetch a type by id.
    async fn get(&self, id: Uuid) -> Result<Option<TeamType>>;

    /// List a team's types in creation order, optionally for one entity kind.
    async fn list_for_team(
        &self,
        team_id: Uuid,
        kind: Option<EntityKind>,
        include_inactive: bool,
    ) -> Result<Vec<TeamType>>;

    /// Fetch several types in creation order. Unknown ids are skipped.
    async fn list_by_ids(&self, ids: &[Uuid]) -> Result<Vec<TeamType>>;

    /// Overwrite the mutable columns (name, description, icon, color, active).
    async fn update(&self, ty: &TeamType) -> Result<TeamType>;

    /// Number of entities currently assigned the type.
    async fn usage_count(&self, id: Uuid) -> Result<i64>;

    /// Delete the type only if no entity is assigned to it, cascading to its
    /// field definitions and their values in the same atomic step.
    ///
    /// Fails with `Error::Dependency` when the type is in use at execution
    /// time and `Error::TypeNotFound` when it does not exist.
    async fn delete_if_unused(&self, id: Uuid) -> Result<CascadeSummary>;
}

// =============================================================================
// FIELD DEFINITION REPOSITORY
// =============================================================================

/// Storage for field definitions.
#[async_trait]
pub trait FieldDefinitionRepository: Send + Sync {
    /// Persist a new definition at the end of its type's display order.
    /// The incoming `display_order` is ignored.
    async fn insert(&self, def: FieldDefinition) -> Result<FieldDefinition>;

    /// Fetch a definition by id.
    async fn get(&self, id: Uuid) -> Result<Option<FieldDefinition>>;

    /// Definitions of one type ordered by `display_order`.
    async fn list_for_type(&self, type_id: Uuid) -> Result<Vec<FieldDefinition>>;

    /// Definitions of several types, each type's ordered by `display_order`.
    async fn list_for_types(&self, type_ids: &[Uuid]) -> Result<Vec<FieldDefinition>>;

    /// Overwrite the mutable columns of a definition.
    async fn update(&self, def: &FieldDefinition) -> Result<FieldDefinition>;

    /// Delete a definition and every value bound to it. Returns the number
    /// of values removed.
    async fn delete(&self, id: Uuid) -> Result<u64>;

    /// Append `option` unless an identical string is already present.
    ///
    /// The presence check, the `max_options` check and the append happen
    /// atomically, so concurrent calls with the same candidate add it once
    /// and concurrent calls with different candidates never exceed the
    /// limit. A full list yields a `Validation` error keyed `option`.
    /// Returns the definition after the call and whether it changed.
    async fn append_option_if_absent(
        &self,
        id: Uuid,
        option: &str,
        max_options: usize,
    ) -> Result<(FieldDefinition, bool)>;

    /// Set `display_order` to each id's position in `ordered_ids`.
    async fn reorder(&self, type_id: Uuid, ordered_ids: &[Uuid]) -> Result<()>;
}

// =============================================================================
// FIELD VALUE REPOSITORY
// =============================================================================

/// Storage for per-entity field values.
#[async_trait]
pub trait FieldValueRepository: Send + Sync {
    /// All stored values of an entity.
    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<FieldValue>>;

    /// Replace the entity's values for the definitions in `scope` with
    /// `values`. Values bound to definitions outside `scope` are untouched.
    /// Readers observe either the old set or the new one, never a mix.
    async fn replace_for_entity(
        &self,
        entity_id: Uuid,
        scope: &[Uuid],
        values: Vec<FieldValue>,
    ) -> Result<()>;

    /// Remove every value of an entity. Returns the number removed.
    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64>;
}

// =============================================================================
// ASSIGNMENT REPOSITORY
// =============================================================================

/// Storage for entity ⇄ type membership.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Link an entity to a type. Returns false when already linked.
    async fn assign(&self, entity_id: Uuid, kind: EntityKind, type_id: Uuid) -> Result<bool>;

    /// Unlink an entity from a type. Returns false when it was not linked.
    async fn unassign(&self, entity_id: Uuid, type_id: Uuid) -> Result<bool>;

    /// Replace the entity's type membership with exactly `type_ids`.
    async fn set_for_entity(&self, entity_id: Uuid, kind: EntityKind, type_ids: &[Uuid])
        -> Result<()>;

    /// Ids of the types assigned to an entity of `kind`.
    async fn list_type_ids_for_entity(&self, entity_id: Uuid, kind: EntityKind)
        -> Result<Vec<Uuid>>;

    /// Remove every assignment of an entity. Returns the number removed.
    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64>;
}

/// A backend implementing every repository, shareable behind one `Arc`.
pub trait SchemaStore:
    TypeRepository + FieldDefinitionRepository + FieldValueRepository + AssignmentRepository
{
}

impl<T> SchemaStore for T where
    T: TypeRepository + FieldDefinitionRepository + FieldValueRepository + AssignmentRepository
{
}
