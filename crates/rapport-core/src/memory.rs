//! In-memory implementation of every repository trait.
//!
//! All state sits behind one `RwLock`, so each trait method is a single
//! atomic step: conditional type deletion, option append and value-set
//! replacement all observe and mutate state under the same write guard.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rapport_core::{memory::InMemoryStore, CustomFields, Validator};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let engine = CustomFields::with_store(store, Validator::default());
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, FieldError, Result};
use crate::models::*;
use crate::traits::*;

#[derive(Debug, Default)]
struct State {
    types: HashMap<Uuid, TeamType>,
    fields: HashMap<Uuid, FieldDefinition>,
    values: HashMap<Uuid, Vec<FieldValue>>,
    assignments: Vec<EntityTypeAssignment>,
}

impl State {
    fn usage_count(&self, type_id: Uuid) -> i64 {
        self.assignments
            .iter()
            .filter(|a| a.type_id == type_id)
            .count() as i64
    }

    fn with_usage(&self, ty: &TeamType) -> TeamType {
        let mut out = ty.clone();
        out.usage_count = self.usage_count(ty.id);
        out
    }

    fn sorted_types<'a, I>(&self, types: I) -> Vec<TeamType>
    where
        I: Iterator<Item = &'a TeamType>,
    {
        let mut out: Vec<TeamType> = types.map(|t| self.with_usage(t)).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    fn sorted_fields<'a, I>(fields: I) -> Vec<FieldDefinition>
    where
        I: Iterator<Item = &'a FieldDefinition>,
    {
        let mut out: Vec<FieldDefinition> = fields.cloned().collect();
        out.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        out
    }
}

/// Process-local store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fail_value_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent value write fail before touching state, to
    /// exercise storage-failure paths.
    pub fn fail_value_writes(&self, fail: bool) {
        self.fail_value_writes.store(fail, Ordering::SeqCst);
    }

    /// Total number of stored field values across all entities.
    pub async fn value_count(&self) -> usize {
        self.state.read().await.values.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl TypeRepository for InMemoryStore {
    async fn insert(&self, ty: TeamType) -> Result<TeamType> {
        let mut state = self.state.write().await;
        state.types.insert(ty.id, ty.clone());
        Ok(state.with_usage(&ty))
    }

    async fn get(&self, id: Uuid) -> Result<Option<TeamType>> {
        let state = self.state.read().await;
        Ok(state.types.get(&id).map(|t| state.with_usage(t)))
    }

    async fn list_for_team(
        &self,
        team_id: Uuid,
        kind: Option<EntityKind>,
        include_inactive: bool,
    ) -> Result<Vec<TeamType>> {
        let state = self.state.read().await;
        Ok(state.sorted_types(state.types.values().filter(|t| {
            t.team_id == team_id
                && kind.map_or(true, |k| t.entity_kind == k)
                && (include_inactive || t.is_active)
        })))
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> Result<Vec<TeamType>> {
        let state = self.state.read().await;
        Ok(state.sorted_types(ids.iter().filter_map(|id| state.types.get(id))))
    }

    async fn update(&self, ty: &TeamType) -> Result<TeamType> {
        let mut state = self.state.write().await;
        let existing = state
            .types
            .get_mut(&ty.id)
            .ok_or(Error::TypeNotFound(ty.id))?;
        existing.name = ty.name.clone();
        existing.description = ty.description.clone();
        existing.icon = ty.icon.clone();
        existing.color = ty.color.clone();
        existing.is_active = ty.is_active;
        existing.updated_at = Utc::now();
        let updated = existing.clone();
        Ok(state.with_usage(&updated))
    }

    async fn usage_count(&self, id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        if !state.types.contains_key(&id) {
            return Err(Error::TypeNotFound(id));
        }
        Ok(state.usage_count(id))
    }

    async fn delete_if_unused(&self, id: Uuid) -> Result<CascadeSummary> {
        let mut state = self.state.write().await;
        let ty = state.types.get(&id).ok_or(Error::TypeNotFound(id))?;
        let usage = state.usage_count(id);
        if usage > 0 {
            return Err(Error::Dependency(ty.in_use_message(usage)));
        }

        let field_ids: HashSet<Uuid> = state
            .fields
            .values()
            .filter(|f| f.type_id == id)
            .map(|f| f.id)
            .collect();
        state.fields.retain(|fid, _| !field_ids.contains(fid));

        let mut values_removed = 0u64;
        for values in state.values.values_mut() {
            let before = values.len();
            values.retain(|v| !field_ids.contains(&v.field_definition_id));
            values_removed += (before - values.len()) as u64;
        }
        state.values.retain(|_, v| !v.is_empty());
        state.assignments.retain(|a| a.type_id != id);
        state.types.remove(&id);

        Ok(CascadeSummary {
            fields_removed: field_ids.len() as u64,
            values_removed,
        })
    }
}

#[async_trait]
impl FieldDefinitionRepository for InMemoryStore {
    async fn insert(&self, mut def: FieldDefinition) -> Result<FieldDefinition> {
        let mut state = self.state.write().await;
        if !state.types.contains_key(&def.type_id) {
            return Err(Error::TypeNotFound(def.type_id));
        }
        def.display_order = state
            .fields
            .values()
            .filter(|f| f.type_id == def.type_id)
            .map(|f| f.display_order + 1)
            .max()
            .unwrap_or(0);
        state.fields.insert(def.id, def.clone());
        Ok(def)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FieldDefinition>> {
        Ok(self.state.read().await.fields.get(&id).cloned())
    }

    async fn list_for_type(&self, type_id: Uuid) -> Result<Vec<FieldDefinition>> {
        let state = self.state.read().await;
        Ok(State::sorted_fields(
            state.fields.values().filter(|f| f.type_id == type_id),
        ))
    }

    async fn list_for_types(&self, type_ids: &[Uuid]) -> Result<Vec<FieldDefinition>> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for type_id in type_ids {
            out.extend(State::sorted_fields(
                state.fields.values().filter(|f| f.type_id == *type_id),
            ));
        }
        Ok(out)
    }

    async fn update(&self, def: &FieldDefinition) -> Result<FieldDefinition> {
        let mut state = self.state.write().await;
        let existing = state
            .fields
            .get_mut(&def.id)
            .ok_or(Error::FieldNotFound(def.id))?;
        existing.name = def.name.clone();
        existing.field_kind = def.field_kind;
        existing.description = def.description.clone();
        existing.is_required = def.is_required;
        existing.default_value = def.default_value.clone();
        existing.options = def.options.clone();
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        if state.fields.remove(&id).is_none() {
            return Err(Error::FieldNotFound(id));
        }
        let mut removed = 0u64;
        for values in state.values.values_mut() {
            let before = values.len();
            values.retain(|v| v.field_definition_id != id);
            removed += (before - values.len()) as u64;
        }
        state.values.retain(|_, v| !v.is_empty());
        Ok(removed)
    }

    async fn append_option_if_absent(
        &self,
        id: Uuid,
        option: &str,
        max_options: usize,
    ) -> Result<(FieldDefinition, bool)> {
        let mut state = self.state.write().await;
        let def = state.fields.get_mut(&id).ok_or(Error::FieldNotFound(id))?;
        if def.options.iter().any(|o| o == option) {
            return Ok((def.clone(), false));
        }
        if def.options.len() >= max_options {
            return Err(Error::validation(
                "option",
                FieldError::too_many_options(max_options),
            ));
        }
        def.options.push(option.to_string());
        def.updated_at = Utc::now();
        Ok((def.clone(), true))
    }

    async fn reorder(&self, type_id: Uuid, ordered_ids: &[Uuid]) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(stray) = ordered_ids.iter().find(|id| {
            state
                .fields
                .get(*id)
                .map_or(true, |f| f.type_id != type_id)
        }) {
            return Err(Error::InvalidInput(format!(
                "field {} does not belong to type {}",
                stray, type_id
            )));
        }

        let current = State::sorted_fields(state.fields.values().filter(|f| f.type_id == type_id));
        let trailing = current.iter().filter(|f| !ordered_ids.contains(&f.id));
        let order: Vec<Uuid> = ordered_ids
            .iter()
            .copied()
            .chain(trailing.map(|f| f.id))
            .collect();
        for (position, id) in order.iter().enumerate() {
            if let Some(def) = state.fields.get_mut(id) {
                def.display_order = position as i32;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FieldValueRepository for InMemoryStore {
    async fn list_for_entity(&self, entity_id: Uuid) -> Result<Vec<FieldValue>> {
        Ok(self
            .state
            .read()
            .await
            .values
            .get(&entity_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_for_entity(
        &self,
        entity_id: Uuid,
        scope: &[Uuid],
        values: Vec<FieldValue>,
    ) -> Result<()> {
        if self.fail_value_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("value store unavailable".to_string()));
        }
        let mut state = self.state.write().await;
        if let Some(missing) = values
            .iter()
            .find(|v| !state.fields.contains_key(&v.field_definition_id))
        {
            return Err(Error::FieldNotFound(missing.field_definition_id));
        }
        if let Some(stray) = values
            .iter()
            .find(|v| !scope.contains(&v.field_definition_id))
        {
            return Err(Error::InvalidInput(format!(
                "value for field {} is outside the replaced scope",
                stray.field_definition_id
            )));
        }

        let mut kept: Vec<FieldValue> = state
            .values
            .remove(&entity_id)
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !scope.contains(&v.field_definition_id))
            .collect();
        kept.extend(values);
        if !kept.is_empty() {
            state.values.insert(entity_id, kept);
        }
        Ok(())
    }

    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(state
            .values
            .remove(&entity_id)
            .map_or(0, |v| v.len() as u64))
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn assign(&self, entity_id: Uuid, kind: EntityKind, type_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.types.contains_key(&type_id) {
            return Err(Error::TypeNotFound(type_id));
        }
        if state
            .assignments
            .iter()
            .any(|a| a.entity_id == entity_id && a.type_id == type_id)
        {
            return Ok(false);
        }
        state.assignments.push(EntityTypeAssignment {
            entity_id,
            entity_kind: kind,
            type_id,
            assigned_at: Utc::now(),
        });
        Ok(true)
    }

    async fn unassign(&self, entity_id: Uuid, type_id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state
            .assignments
            .retain(|a| !(a.entity_id == entity_id && a.type_id == type_id));
        Ok(state.assignments.len() != before)
    }

    async fn set_for_entity(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
        type_ids: &[Uuid],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(missing) = type_ids.iter().find(|id| !state.types.contains_key(*id)) {
            return Err(Error::TypeNotFound(*missing));
        }
        let now = Utc::now();
        let mut kept: Vec<EntityTypeAssignment> = Vec::new();
        for type_id in type_ids {
            if kept.iter().any(|a| a.type_id == *type_id) {
                continue;
            }
            let existing = state
                .assignments
                .iter()
                .find(|a| a.entity_id == entity_id && a.type_id == *type_id)
                .cloned();
            kept.push(existing.unwrap_or(EntityTypeAssignment {
                entity_id,
                entity_kind: kind,
                type_id: *type_id,
                assigned_at: now,
            }));
        }
        state.assignments.retain(|a| a.entity_id != entity_id);
        state.assignments.extend(kept);
        Ok(())
    }

    async fn list_type_ids_for_entity(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
    ) -> Result<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.entity_id == entity_id && a.entity_kind == kind)
            .map(|a| a.type_id)
            .collect())
    }

    async fn delete_for_entity(&self, entity_id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state.assignments.retain(|a| a.entity_id != entity_id);
        Ok((before - state.assignments.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team_type(team_id: Uuid, kind: EntityKind, name: &str) -> TeamType {
        let now = Utc::now();
        TeamType {
            id: new_v7(),
            team_id,
            entity_kind: kind,
            name: name.to_string(),
            description: None,
            icon: "tag".to_string(),
            color: "#000000".to_string(),
            is_active: true,
            usage_count: 0,
            source_template_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn field(type_id: Uuid, name: &str, kind: FieldKind) -> FieldDefinition {
        let now = Utc::now();
        FieldDefinition {
            id: new_v7(),
            type_id,
            name: name.to_string(),
            field_kind: kind,
            description: None,
            is_required: false,
            default_value: None,
            options: Vec::new(),
            display_order: 99,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_display_order() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Contact, "A"))
            .await
            .unwrap();
        let a = FieldDefinitionRepository::insert(&store, field(ty.id, "a", FieldKind::Text))
            .await
            .unwrap();
        let b = FieldDefinitionRepository::insert(&store, field(ty.id, "b", FieldKind::Text))
            .await
            .unwrap();
        assert_eq!(a.display_order, 0);
        assert_eq!(b.display_order, 1);
    }

    #[tokio::test]
    async fn test_insert_field_for_missing_type_fails() {
        let store = InMemoryStore::new();
        let err = FieldDefinitionRepository::insert(&store, field(Uuid::new_v4(), "a", FieldKind::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_if_unused_refuses_assigned_type() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Company, "Vendor"))
            .await
            .unwrap();
        let entity = Uuid::new_v4();
        store.assign(entity, EntityKind::Company, ty.id).await.unwrap();

        let err = store.delete_if_unused(ty.id).await.unwrap_err();
        assert!(matches!(err, Error::Dependency(ref msg) if msg.contains("1 entity")));
        assert!(TypeRepository::get(&store, ty.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_append_option_is_idempotent() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Contact, "A"))
            .await
            .unwrap();
        let def = FieldDefinitionRepository::insert(&store, field(ty.id, "Tier", FieldKind::Dropdown))
            .await
            .unwrap();

        let (_, changed) = store.append_option_if_absent(def.id, "Gold", 10).await.unwrap();
        assert!(changed);
        let (after, changed) = store.append_option_if_absent(def.id, "Gold", 10).await.unwrap();
        assert!(!changed);
        assert_eq!(after.options, vec!["Gold".to_string()]);
    }

    #[tokio::test]
    async fn test_reorder_puts_unlisted_fields_last() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Contact, "A"))
            .await
            .unwrap();
        for name in ["a", "b"] {
            FieldDefinitionRepository::insert(&store, field(ty.id, name, FieldKind::Text))
                .await
                .unwrap();
        }
        let c = FieldDefinitionRepository::insert(&store, field(ty.id, "c", FieldKind::Text))
            .await
            .unwrap();

        store.reorder(ty.id, &[c.id]).await.unwrap();
        let names: Vec<String> = store
            .list_for_type(ty.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_replace_rejects_unknown_definition() {
        let store = InMemoryStore::new();
        let entity = Uuid::new_v4();
        let stray = Uuid::new_v4();
        let err = store
            .replace_for_entity(entity, &[stray], vec![FieldValue::new(entity, stray, json!("x"))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_option_respects_limit() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Contact, "A"))
            .await
            .unwrap();
        let def = FieldDefinitionRepository::insert(&store, field(ty.id, "Tier", FieldKind::Dropdown))
            .await
            .unwrap();

        store.append_option_if_absent(def.id, "Gold", 1).await.unwrap();
        let (_, changed) = store.append_option_if_absent(def.id, "Gold", 1).await.unwrap();
        assert!(!changed);
        let err = store
            .append_option_if_absent(def.id, "Silver", 1)
            .await
            .unwrap_err();
        assert!(err.validation_errors().unwrap().get("option").is_some());
        let def = FieldDefinitionRepository::get(&store, def.id).await.unwrap().unwrap();
        assert_eq!(def.options, vec!["Gold".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_keeps_values_outside_scope() {
        let store = InMemoryStore::new();
        let ty = TypeRepository::insert(&store, team_type(Uuid::new_v4(), EntityKind::Contact, "A"))
            .await
            .unwrap();
        let a = FieldDefinitionRepository::insert(&store, field(ty.id, "a", FieldKind::Text))
            .await
            .unwrap();
        let b = FieldDefinitionRepository::insert(&store, field(ty.id, "b", FieldKind::Text))
            .await
            .unwrap();
        let entity = Uuid::new_v4();

        store
            .replace_for_entity(
                entity,
                &[a.id, b.id],
                vec![
                    FieldValue::new(entity, a.id, json!("x")),
                    FieldValue::new(entity, b.id, json!("keep")),
                ],
            )
            .await
            .unwrap();
        store
            .replace_for_entity(entity, &[a.id], vec![FieldValue::new(entity, a.id, json!("y"))])
            .await
            .unwrap();

        let mut payloads: Vec<_> = store
            .list_for_entity(entity)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.payload)
            .collect();
        payloads.sort_by_key(|p| p.to_string());
        assert_eq!(payloads, vec![json!("keep"), json!("y")]);

        store.replace_for_entity(entity, &[a.id], Vec::new()).await.unwrap();
        assert_eq!(store.list_for_entity(entity).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_for_entity_replaces_membership() {
        let store = InMemoryStore::new();
        let team = Uuid::new_v4();
        let a = TypeRepository::insert(&store, team_type(team, EntityKind::Contact, "A"))
            .await
            .unwrap();
        let b = TypeRepository::insert(&store, team_type(team, EntityKind::Contact, "B"))
            .await
            .unwrap();
        let entity = Uuid::new_v4();

        store
            .set_for_entity(entity, EntityKind::Contact, &[a.id, b.id, a.id])
            .await
            .unwrap();
        assert_eq!(store.usage_count(a.id).await.unwrap(), 1);

        store.set_for_entity(entity, EntityKind::Contact, &[b.id]).await.unwrap();
        let ids = store
            .list_type_ids_for_entity(entity, EntityKind::Contact)
            .await
            .unwrap();
        assert_eq!(ids, vec![b.id]);
        assert_eq!(store.usage_count(a.id).await.unwrap(), 0);
    }
}
