//! Built-in type templates.
//!
//! A template is a ready-made type plus its field definitions. Seeding a type
//! from a template copies both and records the template id on the type.

use serde::{Deserialize, Serialize};

use crate::models::{EntityKind, FieldKind};

/// A field a template contributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    pub field_kind: FieldKind,
    pub is_required: bool,
    pub description: Option<String>,
    pub options: Vec<String>,
}

impl TemplateField {
    fn new(name: &str, field_kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            field_kind,
            is_required: false,
            description: None,
            options: Vec::new(),
        }
    }

    fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTemplate {
    /// Stable identifier, `<entity_kind>.<slug>`.
    pub id: String,
    pub entity_kind: EntityKind,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub fields: Vec<TemplateField>,
}

impl TypeTemplate {
    /// The templates shipped with rapport.
    pub fn builtin() -> Vec<TypeTemplate> {
        vec![
            TypeTemplate {
                id: "contact.investor".to_string(),
                entity_kind: EntityKind::Contact,
                name: "Investor".to_string(),
                description: "Individuals who fund deals".to_string(),
                icon: "piggy-bank".to_string(),
                color: "#059669".to_string(),
                fields: vec![
                    TemplateField::new("Net Worth", FieldKind::Currency).required(),
                    TemplateField::new("Investment Focus", FieldKind::MultiSelect)
                        .options(&["Residential", "Commercial", "Land"]),
                    TemplateField::new("Accredited", FieldKind::Checkbox),
                ],
            },
            TypeTemplate {
                id: "contact.buyer".to_string(),
                entity_kind: EntityKind::Contact,
                name: "Buyer".to_string(),
                description: "Prospective purchasers".to_string(),
                icon: "home".to_string(),
                color: "#2563EB".to_string(),
                fields: vec![
                    TemplateField::new("Budget", FieldKind::Currency),
                    TemplateField::new("Pre-approved", FieldKind::Checkbox),
                    TemplateField::new("Target Close Date", FieldKind::Date),
                ],
            },
            TypeTemplate {
                id: "company.title_company".to_string(),
                entity_kind: EntityKind::Company,
                name: "Title Company".to_string(),
                description: "Title and escrow providers".to_string(),
                icon: "file-check".to_string(),
                color: "#7C3AED".to_string(),
                fields: vec![
                    TemplateField::new("License Number", FieldKind::Text).required(),
                    TemplateField::new("Escrow Contact", FieldKind::Email),
                    TemplateField::new("Website", FieldKind::Url),
                ],
            },
            TypeTemplate {
                id: "company.vendor".to_string(),
                entity_kind: EntityKind::Company,
                name: "Vendor".to_string(),
                description: "Service providers".to_string(),
                icon: "truck".to_string(),
                color: "#D97706".to_string(),
                fields: vec![
                    TemplateField::new("Service Category", FieldKind::Dropdown)
                        .options(&["Inspection", "Appraisal", "Staging", "Photography"]),
                    TemplateField::new("Preferred", FieldKind::Checkbox),
                ],
            },
            TypeTemplate {
                id: "employee.contractor".to_string(),
                entity_kind: EntityKind::Employee,
                name: "Contractor".to_string(),
                description: "Non-salaried team members".to_string(),
                icon: "briefcase".to_string(),
                color: "#DC2626".to_string(),
                fields: vec![
                    TemplateField::new("Contract End", FieldKind::Date),
                    TemplateField::new("Hourly Rate", FieldKind::Currency),
                    TemplateField::new("Notes", FieldKind::Textarea)
                        .describe("Scope and terms of engagement"),
                ],
            },
        ]
    }

    /// Look up a built-in template by id.
    pub fn find(id: &str) -> Option<TypeTemplate> {
        Self::builtin().into_iter().find(|t| t.id == id)
    }

    /// Built-in templates for one entity kind.
    pub fn for_kind(kind: EntityKind) -> Vec<TypeTemplate> {
        Self::builtin()
            .into_iter()
            .filter(|t| t.entity_kind == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_template_ids_are_unique() {
        let templates = TypeTemplate::builtin();
        let ids: HashSet<&str> = templates.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), templates.len());
    }

    #[test]
    fn test_template_id_prefix_matches_kind() {
        for t in TypeTemplate::builtin() {
            assert!(t.id.starts_with(&format!("{}.", t.entity_kind)), "{}", t.id);
        }
    }

    #[test]
    fn test_only_choice_fields_carry_options() {
        for t in TypeTemplate::builtin() {
            for f in &t.fields {
                assert!(f.field_kind.is_choice() || f.options.is_empty(), "{}", f.name);
            }
        }
    }

    #[test]
    fn test_every_kind_has_a_template() {
        for kind in EntityKind::ALL {
            assert!(!TypeTemplate::for_kind(kind).is_empty(), "{}", kind);
        }
    }

    #[test]
    fn test_find() {
        let investor = TypeTemplate::find("contact.investor").unwrap();
        assert_eq!(investor.fields[0].name, "Net Worth");
        assert!(investor.fields[0].is_required);
        assert!(TypeTemplate::find("contact.unknown").is_none());
    }
}
