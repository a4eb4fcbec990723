//! The custom-field engine.
//!
//! [`CustomFields`] composes the four repositories with a [`Validator`] and
//! exposes type administration, field administration, option growth, entity
//! type membership, grouped projection and entity saves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::codec::{self, dedup_preserving_order, FieldData};
use crate::defaults;
use crate::error::{Error, FieldError, Result, ValidationErrors};
use crate::models::*;
use crate::projection::{build_groups, TypeGroup};
use crate::templates::TypeTemplate;
use crate::traits::*;
use crate::validation::Validator;

/// Tenant-scoped schema engine over a storage backend.
#[derive(Clone)]
pub struct CustomFields {
    types: Arc<dyn TypeRepository>,
    fields: Arc<dyn FieldDefinitionRepository>,
    values: Arc<dyn FieldValueRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    validator: Validator,
}

impl CustomFields {
    pub fn new(
        types: Arc<dyn TypeRepository>,
        fields: Arc<dyn FieldDefinitionRepository>,
        values: Arc<dyn FieldValueRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        validator: Validator,
    ) -> Self {
        Self {
            types,
            fields,
            values,
            assignments,
            validator,
        }
    }

    /// Build the engine over a single backend implementing every repository.
    pub fn with_store<S: SchemaStore + 'static>(store: Arc<S>, validator: Validator) -> Self {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            validator,
        )
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    // =========================================================================
    // TYPE REGISTRY
    // =========================================================================

    /// Create a type. Names are trimmed and need not be unique.
    #[instrument(skip(self, req), fields(subsystem = "core", component = "types", op = "create_type", team_id = %req.team_id))]
    pub async fn create_type(&self, req: CreateTypeRequest) -> Result<TeamType> {
        let ty = self.build_type(
            req.team_id,
            req.entity_kind,
            &req.name,
            req.description.as_deref(),
            &req.icon,
            &req.color,
        )?;
        let ty = self.types.insert(ty).await?;
        info!(
            type_id = %ty.id,
            entity_kind = %ty.entity_kind,
            "Type created"
        );
        Ok(ty)
    }

    /// Create a type and its fields from a built-in template.
    #[instrument(skip(self), fields(subsystem = "core", component = "types", op = "create_type_from_template"))]
    pub async fn create_type_from_template(
        &self,
        team_id: Uuid,
        template_id: &str,
    ) -> Result<(TeamType, Vec<FieldDefinition>)> {
        let template = TypeTemplate::find(template_id)
            .ok_or_else(|| Error::NotFound(format!("template '{}'", template_id)))?;

        let mut ty = self.build_type(
            team_id,
            template.entity_kind,
            &template.name,
            Some(&template.description),
            &template.icon,
            &template.color,
        )?;
        ty.source_template_id = Some(template.id.clone());
        let ty = self.types.insert(ty).await?;

        let mut created = Vec::with_capacity(template.fields.len());
        for field in template.fields {
            let mut req = CreateFieldRequest::new(ty.id, field.name, field.field_kind)
                .with_options(field.options);
            req.is_required = field.is_required;
            req.description = field.description;
            created.push(self.create_field(req).await?);
        }

        info!(
            type_id = %ty.id,
            template_id,
            result_count = created.len(),
            "Type created from template"
        );
        Ok((ty, created))
    }

    /// Apply a partial update. The entity kind never changes.
    #[instrument(skip(self, req), fields(subsystem = "core", component = "types", op = "update_type", type_id = %id))]
    pub async fn update_type(&self, id: Uuid, req: UpdateTypeRequest) -> Result<TeamType> {
        let mut ty = self.get_type(id).await?;
        let mut errors = ValidationErrors::new();

        if let Some(name) = req.name.as_deref() {
            match self.validator.check_name(name) {
                Ok(name) => ty.name = name,
                Err(e) => errors.add("name", e),
            }
        }
        if let Some(description) = req.description {
            match self.validator.check_description(description.as_deref()) {
                Ok(description) => ty.description = description,
                Err(e) => errors.add("description", e),
            }
        }
        errors.into_result()?;

        if let Some(icon) = req.icon {
            ty.icon = or_default(&icon, defaults::TYPE_ICON);
        }
        if let Some(color) = req.color {
            ty.color = or_default(&color, defaults::TYPE_COLOR);
        }
        if let Some(active) = req.is_active {
            if active != ty.is_active {
                info!(is_active = active, "Type activation changed");
            }
            ty.is_active = active;
        }

        self.types.update(&ty).await
    }

    pub async fn get_type(&self, id: Uuid) -> Result<TeamType> {
        self.types.get(id).await?.ok_or(Error::TypeNotFound(id))
    }

    /// A team's types in creation order.
    pub async fn list_types(
        &self,
        team_id: Uuid,
        kind: Option<EntityKind>,
        include_inactive: bool,
    ) -> Result<Vec<TeamType>> {
        self.types.list_for_team(team_id, kind, include_inactive).await
    }

    /// Advisory check; [`delete_type`](Self::delete_type) enforces it again.
    pub async fn can_delete(&self, id: Uuid) -> Result<DeleteCheck> {
        let ty = self.get_type(id).await?;
        let usage = self.types.usage_count(id).await?;
        Ok(if usage > 0 {
            DeleteCheck::blocked(ty.in_use_message(usage))
        } else {
            DeleteCheck::allowed()
        })
    }

    /// Delete an unused type with its field definitions and their values.
    #[instrument(skip(self), fields(subsystem = "core", component = "types", op = "delete_type", type_id = %id))]
    pub async fn delete_type(&self, id: Uuid) -> Result<CascadeSummary> {
        match self.types.delete_if_unused(id).await {
            Ok(summary) => {
                info!(
                    fields_removed = summary.fields_removed,
                    values_removed = summary.values_removed,
                    "Type deleted"
                );
                Ok(summary)
            }
            Err(Error::Dependency(reason)) => {
                warn!(reason = %reason, "Type deletion rejected");
                Err(Error::Dependency(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn build_type(
        &self,
        team_id: Uuid,
        entity_kind: EntityKind,
        name: &str,
        description: Option<&str>,
        icon: &str,
        color: &str,
    ) -> Result<TeamType> {
        let mut errors = ValidationErrors::new();
        let name = self
            .validator
            .check_name(name)
            .map_err(|e| errors.add("name", e))
            .ok();
        let description = self
            .validator
            .check_description(description)
            .map_err(|e| errors.add("description", e))
            .ok()
            .flatten();
        errors.into_result()?;

        let now = Utc::now();
        Ok(TeamType {
            id: new_v7(),
            team_id,
            entity_kind,
            name: name.unwrap_or_default(),
            description,
            icon: or_default(icon, defaults::TYPE_ICON),
            color: or_default(color, defaults::TYPE_COLOR),
            is_active: true,
            usage_count: 0,
            source_template_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    // =========================================================================
    // FIELD DEFINITIONS
    // =========================================================================

    /// Create a field definition at the end of its type's display order.
    #[instrument(skip(self, req), fields(subsystem = "core", component = "fields", op = "create_field", type_id = %req.type_id))]
    pub async fn create_field(&self, req: CreateFieldRequest) -> Result<FieldDefinition> {
        self.get_type(req.type_id).await?;

        let mut errors = ValidationErrors::new();
        let name = self
            .validator
            .check_name(&req.name)
            .map_err(|e| errors.add("name", e))
            .ok();
        let description = self
            .validator
            .check_description(req.description.as_deref())
            .map_err(|e| errors.add("description", e))
            .ok()
            .flatten();
        let mut options = self
            .validator
            .check_options(req.field_kind, req.options.as_deref(), req.require_options)
            .map_err(|e| errors.add("options", e))
            .unwrap_or_default();
        let default_value = self
            .encode_default(req.field_kind, req.default_value, &mut options)
            .map_err(|e| errors.add("default_value", e))
            .ok()
            .flatten();
        errors.into_result()?;

        let now = Utc::now();
        let def = self
            .fields
            .insert(FieldDefinition {
                id: new_v7(),
                type_id: req.type_id,
                name: name.unwrap_or_default(),
                field_kind: req.field_kind,
                description,
                is_required: req.is_required,
                default_value,
                options,
                display_order: 0,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            field_id = %def.id,
            field_kind = %def.field_kind,
            display_order = def.display_order,
            "Field definition created"
        );
        Ok(def)
    }

    /// Apply a partial update.
    ///
    /// Changing the kind is allowed. Values stored under the old kind decode
    /// as empty afterwards, options are dropped when the new kind is not a
    /// choice kind, and a default that no longer decodes is cleared.
    #[instrument(skip(self, req), fields(subsystem = "core", component = "fields", op = "update_field", field_id = %id))]
    pub async fn update_field(&self, id: Uuid, req: UpdateFieldRequest) -> Result<FieldDefinition> {
        let mut def = self.get_field(id).await?;
        let kind = req.field_kind.unwrap_or(def.field_kind);
        let kind_changed = kind != def.field_kind;
        let mut errors = ValidationErrors::new();

        if let Some(name) = req.name.as_deref() {
            match self.validator.check_name(name) {
                Ok(name) => def.name = name,
                Err(e) => errors.add("name", e),
            }
        }
        if let Some(description) = req.description {
            match self.validator.check_description(description.as_deref()) {
                Ok(description) => def.description = description,
                Err(e) => errors.add("description", e),
            }
        }

        let current = if kind.is_choice() {
            def.options.clone()
        } else {
            Vec::new()
        };
        let requested = req.options.as_deref().unwrap_or(current.as_slice());
        let mut options = self
            .validator
            .check_options(kind, Some(requested), req.require_options)
            .map_err(|e| errors.add("options", e))
            .unwrap_or_default();

        match req.default_value {
            Some(default) => match self.encode_default(kind, default, &mut options) {
                Ok(encoded) => def.default_value = encoded,
                Err(e) => errors.add("default_value", e),
            },
            None if kind_changed => {
                def.default_value = def
                    .default_value
                    .take()
                    .filter(|raw| !codec::decode(kind, raw).is_empty());
            }
            None => {}
        }
        errors.into_result()?;

        if kind_changed {
            info!(
                from = %def.field_kind,
                to = %kind,
                "Field kind changed; existing values are stale"
            );
        }
        def.field_kind = kind;
        def.options = options;
        if let Some(required) = req.is_required {
            def.is_required = required;
        }

        self.fields.update(&def).await
    }

    pub async fn get_field(&self, id: Uuid) -> Result<FieldDefinition> {
        self.fields.get(id).await?.ok_or(Error::FieldNotFound(id))
    }

    /// A type's field definitions in display order.
    pub async fn list_fields(&self, type_id: Uuid) -> Result<Vec<FieldDefinition>> {
        self.fields.list_for_type(type_id).await
    }

    /// Reorder a type's fields. Ids left out keep their relative order after
    /// the listed ones.
    #[instrument(skip(self, ordered_ids), fields(subsystem = "core", component = "fields", op = "reorder_fields", type_id = %type_id))]
    pub async fn reorder_fields(
        &self,
        type_id: Uuid,
        ordered_ids: &[Uuid],
    ) -> Result<Vec<FieldDefinition>> {
        self.get_type(type_id).await?;
        let unique: HashSet<&Uuid> = ordered_ids.iter().collect();
        if unique.len() != ordered_ids.len() {
            return Err(Error::InvalidInput(
                "field ids must not repeat".to_string(),
            ));
        }
        self.fields.reorder(type_id, ordered_ids).await?;
        self.fields.list_for_type(type_id).await
    }

    /// Delete a field definition and every value stored for it.
    #[instrument(skip(self), fields(subsystem = "core", component = "fields", op = "delete_field", field_id = %id))]
    pub async fn delete_field(&self, id: Uuid) -> Result<u64> {
        let removed = self.fields.delete(id).await?;
        info!(values_removed = removed, "Field definition deleted");
        Ok(removed)
    }

    /// Encode a default under `kind`, growing `options` with any choice it
    /// selects. Empty defaults are not kept.
    fn encode_default(
        &self,
        kind: FieldKind,
        default: Option<FieldData>,
        options: &mut Vec<String>,
    ) -> std::result::Result<Option<serde_json::Value>, FieldError> {
        let Some(data) = default.map(normalize_choices) else {
            return Ok(None);
        };
        if data.is_empty() {
            return Ok(None);
        }
        let encoded = codec::encode(kind, &data)?;
        for option in data.selected_options() {
            if !options.iter().any(|o| o == option) {
                options.push(option.to_string());
            }
        }
        if options.len() > self.validator.limits().max_options {
            return Err(FieldError::too_many_options(self.validator.limits().max_options));
        }
        Ok(Some(encoded))
    }

    // =========================================================================
    // OPTION GROWTH
    // =========================================================================

    /// Append `candidate` to a choice field's options unless already present.
    ///
    /// Comparison is exact and case-sensitive after trimming. Safe to call
    /// concurrently; a candidate is added at most once.
    #[instrument(skip(self, candidate), fields(subsystem = "core", component = "options", op = "ensure_option", field_id = %field_id))]
    pub async fn ensure_option(&self, field_id: Uuid, candidate: &str) -> Result<FieldDefinition> {
        let def = self.get_field(field_id).await?;
        if !def.field_kind.is_choice() {
            return Err(Error::InvalidInput(format!(
                "field '{}' is a {} field and has no options",
                def.name, def.field_kind
            )));
        }
        let option = self
            .validator
            .check_option(candidate)
            .map_err(|e| Error::validation("option", e))?;
        if def.options.contains(&option) {
            return Ok(def);
        }

        let (def, added) = self
            .fields
            .append_option_if_absent(field_id, &option, self.validator.limits().max_options)
            .await?;
        if added {
            info!(option = %option, "Option added");
        } else {
            debug!(option = %option, "Option already present");
        }
        Ok(def)
    }

    // =========================================================================
    // ENTITY TYPE MEMBERSHIP
    // =========================================================================

    /// Add types to an entity, keeping its existing ones. Returns how many
    /// were newly assigned.
    #[instrument(skip(self, type_ids), fields(subsystem = "core", component = "assignments", op = "assign_types", entity_id = %entity_id, entity_kind = %kind))]
    pub async fn assign_types(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
        type_ids: &[Uuid],
    ) -> Result<usize> {
        let current = self
            .assignments
            .list_type_ids_for_entity(entity_id, kind)
            .await?;
        self.check_assignable(kind, type_ids, &current).await?;

        let mut added = 0;
        for type_id in type_ids {
            if self.assignments.assign(entity_id, kind, *type_id).await? {
                added += 1;
            }
        }
        info!(result_count = added, "Types assigned");
        Ok(added)
    }

    /// Remove one type from an entity. Stored values are kept.
    pub async fn unassign_type(&self, entity_id: Uuid, type_id: Uuid) -> Result<bool> {
        let removed = self.assignments.unassign(entity_id, type_id).await?;
        debug!(
            subsystem = "core",
            component = "assignments",
            op = "unassign_type",
            entity_id = %entity_id,
            type_id = %type_id,
            removed,
            "Type unassigned"
        );
        Ok(removed)
    }

    /// Replace an entity's type membership with exactly `type_ids`.
    #[instrument(skip(self, type_ids), fields(subsystem = "core", component = "assignments", op = "set_entity_types", entity_id = %entity_id, entity_kind = %kind))]
    pub async fn set_entity_types(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
        type_ids: &[Uuid],
    ) -> Result<()> {
        let current = self
            .assignments
            .list_type_ids_for_entity(entity_id, kind)
            .await?;
        self.check_assignable(kind, type_ids, &current).await?;
        self.assignments
            .set_for_entity(entity_id, kind, type_ids)
            .await?;
        info!(result_count = type_ids.len(), "Entity types set");
        Ok(())
    }

    /// The types assigned to an entity, in creation order.
    pub async fn entity_types(&self, entity_id: Uuid, kind: EntityKind) -> Result<Vec<TeamType>> {
        let ids = self
            .assignments
            .list_type_ids_for_entity(entity_id, kind)
            .await?;
        self.types.list_by_ids(&ids).await
    }

    /// Every type must exist and match `kind`. Inactive types may be kept
    /// where already assigned but never newly assigned.
    async fn check_assignable(
        &self,
        kind: EntityKind,
        type_ids: &[Uuid],
        current: &[Uuid],
    ) -> Result<()> {
        let found = self.types.list_by_ids(type_ids).await?;
        let by_id: HashMap<Uuid, &TeamType> = found.iter().map(|t| (t.id, t)).collect();
        for id in type_ids {
            let ty = by_id.get(id).ok_or(Error::TypeNotFound(*id))?;
            if ty.entity_kind != kind {
                return Err(Error::InvalidInput(format!(
                    "type '{}' is a {} type and cannot be assigned to a {}",
                    ty.name, ty.entity_kind, kind
                )));
            }
            if !ty.is_active && !current.contains(id) {
                return Err(Error::InvalidInput(format!(
                    "type '{}' is inactive",
                    ty.name
                )));
            }
        }
        Ok(())
    }

    // =========================================================================
    // PROJECTION & VALUES
    // =========================================================================

    /// Grouped view of an entity's custom fields.
    pub async fn project_entity(&self, entity_id: Uuid, kind: EntityKind) -> Result<Vec<TypeGroup>> {
        let start = Instant::now();
        let type_ids = self
            .assignments
            .list_type_ids_for_entity(entity_id, kind)
            .await?;
        if type_ids.is_empty() {
            return Ok(Vec::new());
        }
        let types = self.types.list_by_ids(&type_ids).await?;
        let definitions = self.fields.list_for_types(&type_ids).await?;
        let values = self.values.list_for_entity(entity_id).await?;
        let groups = build_groups(types, definitions, values);

        debug!(
            subsystem = "core",
            component = "projection",
            op = "project_entity",
            entity_id = %entity_id,
            entity_kind = %kind,
            result_count = groups.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Projected entity"
        );
        Ok(groups)
    }

    /// Validate and store an entity's whole value set.
    ///
    /// `submitted` is keyed by field definition id. Definitions are re-read,
    /// so values are checked against current kinds. Fields left out are saved
    /// as empty. Any validation failure writes nothing. New choice options
    /// are appended before the values of the assigned types' definitions are
    /// replaced in one step. Values of types no longer assigned are kept.
    #[instrument(skip(self, submitted), fields(subsystem = "core", component = "values", op = "save_entity_values", entity_id = %entity_id, entity_kind = %kind))]
    pub async fn save_entity_values(
        &self,
        entity_id: Uuid,
        kind: EntityKind,
        submitted: HashMap<Uuid, FieldData>,
    ) -> Result<SaveSummary> {
        let type_ids = self
            .assignments
            .list_type_ids_for_entity(entity_id, kind)
            .await?;
        let definitions = self.fields.list_for_types(&type_ids).await?;

        let mut errors = ValidationErrors::new();
        let known: HashSet<Uuid> = definitions.iter().map(|d| d.id).collect();
        for id in submitted.keys().filter(|id| !known.contains(*id)) {
            errors.add(
                id.to_string(),
                FieldError::invalid("field is not part of the entity's types"),
            );
        }

        let mut submitted = submitted;
        let entries: Vec<(&FieldDefinition, FieldData)> = definitions
            .iter()
            .map(|def| {
                let value = submitted
                    .remove(&def.id)
                    .map(normalize_choices)
                    .unwrap_or_else(|| FieldData::empty_for(def.field_kind));
                (def, value)
            })
            .collect();

        for (def, value) in &entries {
            if let Err(field_errors) = self.validator.validate(def, value) {
                errors.extend_field(def.id.to_string(), field_errors);
            }
        }
        if !errors.is_empty() {
            warn!(error_count = errors.len(), "Entity save rejected");
            return Err(Error::Validation(errors));
        }

        let mut stored = Vec::new();
        for (def, value) in &entries {
            if value.is_empty() && def.field_kind != FieldKind::Checkbox {
                continue;
            }
            let payload = codec::encode(def.field_kind, value)
                .map_err(|e| Error::validation(def.id.to_string(), e))?;
            stored.push(FieldValue::new(entity_id, def.id, payload));
        }

        let max_options = self.validator.limits().max_options;
        let mut options_added = 0;
        for (def, value) in &entries {
            for option in value.selected_options() {
                if def.options.iter().any(|o| o == option) {
                    continue;
                }
                let (_, added) = self
                    .fields
                    .append_option_if_absent(def.id, option, max_options)
                    .await
                    .map_err(|e| match e {
                        Error::Validation(_) => Error::validation(
                            def.id.to_string(),
                            FieldError::too_many_options(max_options),
                        ),
                        other => other,
                    })?;
                if added {
                    options_added += 1;
                }
            }
        }

        let scope: Vec<Uuid> = definitions.iter().map(|d| d.id).collect();
        let values_stored = stored.len();
        self.values
            .replace_for_entity(entity_id, &scope, stored)
            .await?;
        info!(
            value_count = values_stored,
            options_added,
            "Entity values saved"
        );
        Ok(SaveSummary {
            values_stored,
            options_added,
        })
    }

    /// Remove an entity's values and type assignments.
    #[instrument(skip(self), fields(subsystem = "core", component = "values", op = "delete_entity", entity_id = %entity_id))]
    pub async fn delete_entity(&self, entity_id: Uuid) -> Result<EntityCleanup> {
        let values_removed = self.values.delete_for_entity(entity_id).await?;
        let assignments_removed = self.assignments.delete_for_entity(entity_id).await?;
        info!(values_removed, assignments_removed, "Entity custom fields removed");
        Ok(EntityCleanup {
            values_removed,
            assignments_removed,
        })
    }

    /// Value shown for a field when an entity has nothing stored.
    pub async fn default_for(&self, field_id: Uuid) -> Result<FieldData> {
        Ok(codec::default_for(&self.get_field(field_id).await?))
    }
}

/// Trim choice labels and drop blank or repeated selections.
fn normalize_choices(value: FieldData) -> FieldData {
    match value {
        FieldData::Choice(s) => FieldData::Choice(s.trim().to_string()),
        FieldData::MultiChoice(items) => FieldData::MultiChoice(dedup_preserving_order(
            items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )),
        other => other,
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
