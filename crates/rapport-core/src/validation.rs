//! Validation of submitted values and of schema admin input.

use regex::Regex;
use tracing::trace;

use crate::codec::{dedup_preserving_order, FieldData};
use crate::config::SchemaLimits;
use crate::defaults;
use crate::error::{FieldError, Result, ValidationErrors};
use crate::models::{FieldDefinition, FieldKind};
use crate::registry::FieldKindRegistry;

/// Outcome of validating one value against one definition.
pub type ValidationResult = std::result::Result<(), Vec<FieldError>>;

/// Validates values against field definitions and admin input against
/// [`SchemaLimits`].
#[derive(Debug, Clone)]
pub struct Validator {
    registry: FieldKindRegistry,
    limits: SchemaLimits,
    email_pattern: Regex,
    url_pattern: Regex,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(FieldKindRegistry::standard(), SchemaLimits::default())
    }
}

impl Validator {
    pub fn new(registry: FieldKindRegistry, limits: SchemaLimits) -> Self {
        Self {
            registry,
            limits,
            email_pattern: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"),
            url_pattern: Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("valid url pattern"),
        }
    }

    pub fn registry(&self) -> &FieldKindRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &SchemaLimits {
        &self.limits
    }

    /// Validate a semantic value against a definition's current kind and
    /// constraints.
    ///
    /// Choice values outside the definition's options are accepted; they are
    /// appended to the option list when the value is saved.
    pub fn validate(&self, def: &FieldDefinition, value: &FieldData) -> ValidationResult {
        let expected = self.registry.shape(def.field_kind);
        if value.shape() != expected {
            return Err(vec![FieldError::KindMismatch {
                expected: def.field_kind,
                got: value.shape().to_string(),
            }]);
        }

        if value.is_empty() {
            // A required checkbox left unticked is indistinguishable from an
            // unanswered one and is reported as missing.
            return if def.is_required {
                Err(vec![FieldError::RequiredFieldMissing])
            } else {
                Ok(())
            };
        }

        let mut errors = Vec::new();
        match (def.field_kind, value) {
            (FieldKind::Email, FieldData::Text(s)) => {
                if !self.email_pattern.is_match(s.trim()) {
                    errors.push(FieldError::invalid("must be a valid email address"));
                }
            }
            (FieldKind::Url, FieldData::Text(s)) => {
                if !self.url_pattern.is_match(s.trim()) {
                    errors.push(FieldError::invalid("must start with http:// or https://"));
                }
            }
            (FieldKind::Phone, FieldData::Text(s)) => {
                if let Err(e) = check_phone(s) {
                    errors.push(e);
                }
            }
            (FieldKind::Dropdown | FieldKind::MultiSelect, value) => {
                errors.extend(self.check_selected_options(def, value));
            }
            _ => {}
        }

        trace!(
            subsystem = "core",
            component = "validator",
            field_id = %def.id,
            field_kind = %def.field_kind,
            error_count = errors.len(),
            "Validated field value"
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate every value of an entity save, collecting all failures keyed
    /// by field definition id.
    pub fn validate_submission<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a FieldDefinition, &'a FieldData)>,
    {
        let mut errors = ValidationErrors::new();
        for (def, value) in entries {
            if let Err(field_errors) = self.validate(def, value) {
                errors.extend_field(def.id.to_string(), field_errors);
            }
        }
        errors.into_result()
    }

    /// Trimmed, non-empty name within the length limit.
    pub fn check_name(&self, name: &str) -> std::result::Result<String, FieldError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(FieldError::RequiredFieldMissing);
        }
        if trimmed.chars().count() > self.limits.max_name_len {
            return Err(FieldError::invalid(format!(
                "must be {} characters or less",
                self.limits.max_name_len
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Trimmed description; blank becomes `None`.
    pub fn check_description(
        &self,
        description: Option<&str>,
    ) -> std::result::Result<Option<String>, FieldError> {
        let Some(trimmed) = description.map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        if trimmed.chars().count() > self.limits.max_description_len {
            return Err(FieldError::invalid(format!(
                "must be {} characters or less",
                self.limits.max_description_len
            )));
        }
        Ok(Some(trimmed.to_string()))
    }

    /// Normalize an option list for `kind`: trim, drop blanks, de-duplicate
    /// keeping first occurrence.
    pub fn check_options(
        &self,
        kind: FieldKind,
        options: Option<&[String]>,
        require_options: bool,
    ) -> std::result::Result<Vec<String>, FieldError> {
        let supplied = options.unwrap_or_default();
        if !kind.is_choice() {
            if supplied.iter().any(|o| !o.trim().is_empty()) {
                return Err(FieldError::invalid(
                    "options are only allowed on dropdown and multi_select fields",
                ));
            }
            return Ok(Vec::new());
        }

        let normalized = dedup_preserving_order(
            supplied
                .iter()
                .map(|o| o.trim())
                .filter(|o| !o.is_empty())
                .map(str::to_string),
        );

        if require_options && normalized.is_empty() {
            return Err(FieldError::invalid("at least one option is required"));
        }
        if normalized.len() > self.limits.max_options {
            return Err(FieldError::too_many_options(self.limits.max_options));
        }
        if let Some(long) = normalized
            .iter()
            .find(|o| o.chars().count() > self.limits.max_option_len)
        {
            return Err(FieldError::invalid(format!(
                "option '{}' exceeds {} characters",
                long, self.limits.max_option_len
            )));
        }
        Ok(normalized)
    }

    /// A single option candidate submitted for growth.
    pub fn check_option(&self, candidate: &str) -> std::result::Result<String, FieldError> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Err(FieldError::invalid("option cannot be blank"));
        }
        if trimmed.chars().count() > self.limits.max_option_len {
            return Err(FieldError::invalid(format!(
                "option '{}' exceeds {} characters",
                trimmed, self.limits.max_option_len
            )));
        }
        Ok(trimmed.to_string())
    }

    fn check_selected_options(&self, def: &FieldDefinition, value: &FieldData) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let mut new_count = 0usize;
        for option in value.selected_options() {
            match self.check_option(option) {
                Ok(trimmed) => {
                    if !def.options.contains(&trimmed) {
                        new_count += 1;
                    }
                }
                Err(e) => errors.push(e),
            }
        }
        if def.options.len() + new_count > self.limits.max_options {
            errors.push(FieldError::too_many_options(self.limits.max_options));
        }
        errors
    }
}

fn check_phone(raw: &str) -> std::result::Result<(), FieldError> {
    let s = raw.trim();
    if let Some(bad) = s
        .chars()
        .find(|c| !(c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.')))
    {
        return Err(FieldError::invalid(format!(
            "contains invalid character '{}'",
            bad
        )));
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < defaults::PHONE_MIN_DIGITS {
        return Err(FieldError::invalid(format!(
            "must contain at least {} digits",
            defaults::PHONE_MIN_DIGITS
        )));
    }
    Ok(())
}
