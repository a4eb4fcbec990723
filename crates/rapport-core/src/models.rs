//! Domain models for the custom-field engine.
//!
//! Types and field definitions are tenant-scoped schema objects; field values
//! and type assignments bind them to contact, company and employee records
//! owned elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::codec::FieldData;

/// Generate a new time-ordered identifier (UUIDv7).
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// The fixed set of record kinds a Type can categorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Company,
    Employee,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Contact, EntityKind::Company, EntityKind::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Company => "company",
            Self::Employee => "employee",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contact" => Ok(Self::Contact),
            "company" => Ok(Self::Company),
            "employee" => Ok(Self::Employee),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

// =============================================================================
// FIELD KIND
// =============================================================================

/// Storage and input kind of a field definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Email,
    Phone,
    Url,
    Number,
    Currency,
    Date,
    Checkbox,
    Dropdown,
    MultiSelect,
}

impl FieldKind {
    pub const ALL: [FieldKind; 11] = [
        FieldKind::Text,
        FieldKind::Textarea,
        FieldKind::Email,
        FieldKind::Phone,
        FieldKind::Url,
        FieldKind::Number,
        FieldKind::Currency,
        FieldKind::Date,
        FieldKind::Checkbox,
        FieldKind::Dropdown,
        FieldKind::MultiSelect,
    ];

    /// Position in [`FieldKind::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Text => 0,
            Self::Textarea => 1,
            Self::Email => 2,
            Self::Phone => 3,
            Self::Url => 4,
            Self::Number => 5,
            Self::Currency => 6,
            Self::Date => 7,
            Self::Checkbox => 8,
            Self::Dropdown => 9,
            Self::MultiSelect => 10,
        }
    }

    /// Choice kinds draw values from a growable option list.
    pub fn is_choice(&self) -> bool {
        matches!(self, Self::Dropdown | Self::MultiSelect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Number => "number",
            Self::Currency => "currency",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Dropdown => "dropdown",
            Self::MultiSelect => "multi_select",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "text" => Ok(Self::Text),
            "textarea" => Ok(Self::Textarea),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "url" => Ok(Self::Url),
            "number" => Ok(Self::Number),
            "currency" => Ok(Self::Currency),
            "date" => Ok(Self::Date),
            "checkbox" => Ok(Self::Checkbox),
            "dropdown" => Ok(Self::Dropdown),
            "multi_select" | "multiselect" => Ok(Self::MultiSelect),
            _ => Err(format!("Invalid field kind: {}", s)),
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// A tenant-defined category for contacts, companies or employees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamType {
    pub id: Uuid,
    pub team_id: Uuid,
    pub entity_kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    /// Number of entities currently assigned this type. Derived on read.
    pub usage_count: i64,
    pub source_template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TeamType {
    /// Reason shown when deletion is blocked by `usage` assignments.
    pub fn in_use_message(&self, usage: i64) -> String {
        format!(
            "type '{}' is assigned to {} {}",
            self.name,
            usage,
            if usage == 1 { "entity" } else { "entities" }
        )
    }
}

/// Request for creating a type.
#[derive(Debug, Clone)]
pub struct CreateTypeRequest {
    pub team_id: Uuid,
    pub entity_kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
}

/// Partial update of a type. The entity kind is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct UpdateTypeRequest {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

/// Advisory answer to "may this type be deleted right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCheck {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl DeleteCheck {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// What a type deletion removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSummary {
    pub fields_removed: u64,
    pub values_removed: u64,
}

// =============================================================================
// FIELD DEFINITIONS
// =============================================================================

/// A typed attribute declared on a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: Uuid,
    pub type_id: Uuid,
    pub name: String,
    pub field_kind: FieldKind,
    pub description: Option<String>,
    pub is_required: bool,
    /// Default in stored (encoded) form; decoded through the same path as values.
    pub default_value: Option<JsonValue>,
    /// Ordered, de-duplicated. Always empty for non-choice kinds.
    pub options: Vec<String>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a field definition.
#[derive(Debug, Clone)]
pub struct CreateFieldRequest {
    pub type_id: Uuid,
    pub name: String,
    pub field_kind: FieldKind,
    pub is_required: bool,
    pub description: Option<String>,
    pub default_value: Option<FieldData>,
    pub options: Option<Vec<String>>,
    /// Reject a choice field that would start with no options.
    pub require_options: bool,
}

impl CreateFieldRequest {
    pub fn new(type_id: Uuid, name: impl Into<String>, field_kind: FieldKind) -> Self {
        Self {
            type_id,
            name: name.into(),
            field_kind,
            is_required: false,
            description: None,
            default_value: None,
            options: None,
            require_options: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, value: FieldData) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }
}

/// Partial update of a field definition.
#[derive(Debug, Clone, Default)]
pub struct UpdateFieldRequest {
    pub name: Option<String>,
    /// Permitted; previously stored values become stale under the new kind.
    pub field_kind: Option<FieldKind>,
    pub is_required: Option<bool>,
    pub description: Option<Option<String>>,
    pub default_value: Option<Option<FieldData>>,
    pub options: Option<Vec<String>>,
    pub require_options: bool,
}

// =============================================================================
// VALUES & ASSIGNMENTS
// =============================================================================

/// The stored value of one field definition for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub field_definition_id: Uuid,
    pub payload: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl FieldValue {
    pub fn new(entity_id: Uuid, field_definition_id: Uuid, payload: JsonValue) -> Self {
        Self {
            id: new_v7(),
            entity_id,
            field_definition_id,
            payload,
            updated_at: Utc::now(),
        }
    }
}

/// Outcome of an entity save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    /// Values now stored for the entity.
    pub values_stored: usize,
    /// Options appended to choice fields by this save.
    pub options_added: usize,
}

/// What removing an entity's custom-field data deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCleanup {
    pub values_removed: u64,
    pub assignments_removed: u64,
}

/// Membership link between an entity and a type of its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeAssignment {
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    pub type_id: Uuid,
    pub assigned_at: DateTime<Utc>,
}
