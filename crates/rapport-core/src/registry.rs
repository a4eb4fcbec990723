//! Field-kind registry.
//!
//! Maps every [`FieldKind`] to its display label, form input and value shape.
//! A registry is an ordinary value handed to the [`crate::Validator`]; callers
//! that need different labels construct their own.

use serde::{Deserialize, Serialize};

use crate::models::FieldKind;

/// The form control a kind is edited with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    SingleLine,
    MultiLine,
    Email,
    Tel,
    Url,
    Number,
    Currency,
    Date,
    Checkbox,
    Select,
    MultiSelect,
}

/// Shape of the semantic value a kind holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    Text,
    Number,
    Date,
    Checkbox,
    Choice,
    MultiChoice,
}

impl std::fmt::Display for ValueShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Choice => "choice",
            Self::MultiChoice => "multi_choice",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldKindSpec {
    pub kind: FieldKind,
    pub label: String,
    pub input: InputKind,
    pub shape: ValueShape,
}

/// Per-kind behavior table, one entry per [`FieldKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKindRegistry {
    // Indexed by FieldKind::index(); always holds every kind.
    specs: Vec<FieldKindSpec>,
}

impl FieldKindRegistry {
    /// Registry with the stock English labels.
    pub fn standard() -> Self {
        Self {
            specs: FieldKind::ALL.iter().map(|k| standard_spec(*k)).collect(),
        }
    }

    pub fn spec(&self, kind: FieldKind) -> &FieldKindSpec {
        &self.specs[kind.index()]
    }

    pub fn label(&self, kind: FieldKind) -> &str {
        &self.spec(kind).label
    }

    pub fn shape(&self, kind: FieldKind) -> ValueShape {
        self.spec(kind).shape
    }

    /// Override the label shown for a kind.
    pub fn with_label(mut self, kind: FieldKind, label: impl Into<String>) -> Self {
        self.specs[kind.index()].label = label.into();
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldKindSpec> {
        self.specs.iter()
    }
}

impl Default for FieldKindRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_spec(kind: FieldKind) -> FieldKindSpec {
    let (label, input, shape) = match kind {
        FieldKind::Text => ("Text", InputKind::SingleLine, ValueShape::Text),
        FieldKind::Textarea => ("Long Text", InputKind::MultiLine, ValueShape::Text),
        FieldKind::Email => ("Email", InputKind::Email, ValueShape::Text),
        FieldKind::Phone => ("Phone", InputKind::Tel, ValueShape::Text),
        FieldKind::Url => ("URL", InputKind::Url, ValueShape::Text),
        FieldKind::Number => ("Number", InputKind::Number, ValueShape::Number),
        FieldKind::Currency => ("Currency", InputKind::Currency, ValueShape::Number),
        FieldKind::Date => ("Date", InputKind::Date, ValueShape::Date),
        FieldKind::Checkbox => ("Checkbox", InputKind::Checkbox, ValueShape::Checkbox),
        FieldKind::Dropdown => ("Dropdown", InputKind::Select, ValueShape::Choice),
        FieldKind::MultiSelect => ("Multi-Select", InputKind::MultiSelect, ValueShape::MultiChoice),
    };
    FieldKindSpec {
        kind,
        label: label.to_string(),
        input,
        shape,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldData;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = FieldKindRegistry::standard();
        assert_eq!(registry.iter().count(), FieldKind::ALL.len());
        for kind in FieldKind::ALL {
            assert_eq!(registry.spec(kind).kind, kind);
        }
    }

    #[test]
    fn test_shape_matches_empty_value() {
        let registry = FieldKindRegistry::standard();
        for kind in FieldKind::ALL {
            assert_eq!(registry.shape(kind), FieldData::empty_for(kind).shape());
        }
    }

    #[test]
    fn test_with_label_overrides_one_kind() {
        let registry = FieldKindRegistry::standard().with_label(FieldKind::Currency, "Amount");
        assert_eq!(registry.label(FieldKind::Currency), "Amount");
        assert_eq!(registry.label(FieldKind::Number), "Number");
    }

    #[test]
    fn test_choice_kinds_use_select_inputs() {
        let registry = FieldKindRegistry::standard();
        assert_eq!(registry.spec(FieldKind::Dropdown).input, InputKind::Select);
        assert_eq!(registry.spec(FieldKind::MultiSelect).input, InputKind::MultiSelect);
    }
}
