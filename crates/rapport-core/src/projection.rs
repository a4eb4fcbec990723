//! Grouped projection of an entity's custom fields.
//!
//! One group per assigned type, in type creation order, each holding the
//! type's field definitions in `display_order` paired with the entity's
//! decoded value (or the field default when nothing is stored).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::codec::{self, FieldData};
use crate::models::{FieldDefinition, FieldValue, TeamType};

/// A field definition paired with the entity's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedField {
    pub definition: FieldDefinition,
    pub value: FieldData,
    /// True when no value is stored and `value` came from the default.
    pub is_default: bool,
}

/// One assigned type and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeGroup {
    #[serde(rename = "type")]
    pub type_info: TeamType,
    pub fields: Vec<ProjectedField>,
}

impl TypeGroup {
    /// Look up a projected field by definition name.
    pub fn field(&self, name: &str) -> Option<&ProjectedField> {
        self.fields.iter().find(|f| f.definition.name == name)
    }
}

/// Assemble type groups from already-fetched rows.
///
/// `types` may arrive in any order; groups follow creation order. Types that
/// contribute no definitions produce no group.
pub fn build_groups(
    mut types: Vec<TeamType>,
    definitions: Vec<FieldDefinition>,
    values: Vec<FieldValue>,
) -> Vec<TypeGroup> {
    types.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut by_type: HashMap<Uuid, Vec<FieldDefinition>> = HashMap::new();
    for def in definitions {
        by_type.entry(def.type_id).or_default().push(def);
    }
    let stored: HashMap<Uuid, FieldValue> = values
        .into_iter()
        .map(|v| (v.field_definition_id, v))
        .collect();

    let mut groups = Vec::with_capacity(types.len());
    for ty in types {
        let Some(mut defs) = by_type.remove(&ty.id) else {
            continue;
        };
        defs.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let fields = defs
            .into_iter()
            .map(|definition| {
                let (value, is_default) = match stored.get(&definition.id) {
                    Some(v) => (codec::decode(definition.field_kind, &v.payload), false),
                    None => (codec::default_for(&definition), true),
                };
                trace!(
                    subsystem = "core",
                    component = "projection",
                    field_id = %definition.id,
                    is_default,
                    "Projected field"
                );
                ProjectedField {
                    definition,
                    value,
                    is_default,
                }
            })
            .collect();

        groups.push(TypeGroup {
            type_info: ty,
            fields,
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_v7, EntityKind, FieldKind};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn team_type(name: &str, offset_secs: i64) -> TeamType {
        let at = Utc::now() + Duration::seconds(offset_secs);
        TeamType {
            id: new_v7(),
            team_id: Uuid::nil(),
            entity_kind: EntityKind::Contact,
            name: name.to_string(),
            description: None,
            icon: "tag".to_string(),
            color: "#000".to_string(),
            is_active: true,
            usage_count: 1,
            source_template_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn def(type_id: Uuid, name: &str, kind: FieldKind, order: i32) -> FieldDefinition {
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
            display_order: order,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fieldless_type_produces_no_group() {
        let a = team_type("A", 0);
        let b = team_type("B", 1);
        let defs = vec![
            def(a.id, "second", FieldKind::Text, 1),
            def(a.id, "first", FieldKind::Number, 0),
        ];
        let groups = build_groups(vec![b, a.clone()], defs, vec![]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].type_info.id, a.id);
        let names: Vec<&str> = groups[0].fields.iter().map(|f| f.definition.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_groups_follow_creation_order_not_name() {
        let zebra = team_type("Zebra", 0);
        let alpha = team_type("Alpha", 10);
        let defs = vec![
            def(alpha.id, "x", FieldKind::Text, 0),
            def(zebra.id, "y", FieldKind::Text, 0),
        ];
        let groups = build_groups(vec![alpha, zebra], defs, vec![]);
        let names: Vec<&str> = groups.iter().map(|g| g.type_info.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Alpha"]);
    }

    #[test]
    fn test_stored_value_wins_over_default() {
        let ty = team_type("A", 0);
        let mut with_default = def(ty.id, "Tier", FieldKind::Dropdown, 0);
        with_default.default_value = Some(json!("Silver"));
        let plain = def(ty.id, "Score", FieldKind::Number, 1);
        let entity = Uuid::new_v4();
        let values = vec![FieldValue::new(entity, plain.id, json!(7))];

        let groups = build_groups(vec![ty], vec![with_default, plain], values);
        let fields = &groups[0].fields;
        assert_eq!(fields[0].value, FieldData::choice("Silver"));
        assert!(fields[0].is_default);
        assert_eq!(fields[1].value, FieldData::number(7.0));
        assert!(!fields[1].is_default);
    }

    #[test]
    fn test_stale_payload_projects_as_empty() {
        let ty = team_type("A", 0);
        let d = def(ty.id, "Joined", FieldKind::Date, 0);
        let values = vec![FieldValue::new(Uuid::new_v4(), d.id, json!(42))];
        let groups = build_groups(vec![ty], vec![d], values);
        assert_eq!(groups[0].fields[0].value, FieldData::Date(None));
    }

    #[test]
    fn test_field_lookup_by_name() {
        let ty = team_type("A", 0);
        let groups = build_groups(vec![ty.clone()], vec![def(ty.id, "Net Worth", FieldKind::Currency, 0)], vec![]);
        assert!(groups[0].field("Net Worth").is_some());
        assert!(groups[0].field("Missing").is_none());
    }
}
