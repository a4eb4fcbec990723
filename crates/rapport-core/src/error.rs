//! Error types for rapport.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::FieldKind;

/// Result type alias using rapport's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rapport operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input failed one or more constraints. Keyed per field.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Input is structurally wrong for the requested operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Type not found
    #[error("Type not found: {0}")]
    TypeNotFound(Uuid),

    /// Field definition not found
    #[error("Field definition not found: {0}")]
    FieldNotFound(Uuid),

    /// Deletion blocked by usage or dependents
    #[error("Cannot delete: {0}")]
    Dependency(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a validation error carrying a single keyed failure.
    pub fn validation(key: impl Into<String>, error: FieldError) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(key, error);
        Error::Validation(errors)
    }

    /// Field-keyed errors when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Error::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// True for the expected, caller-recoverable error classes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidInput(_)
                | Error::NotFound(_)
                | Error::TypeNotFound(_)
                | Error::FieldNotFound(_)
                | Error::Dependency(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

/// A single constraint failure for one field or attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FieldError {
    /// Field is required and the submitted value is empty.
    RequiredFieldMissing,
    /// Submitted value has the wrong shape for the field's current kind.
    KindMismatch { expected: FieldKind, got: String },
    /// Value or attribute is present but unacceptable.
    Invalid { message: String },
}

impl FieldError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FieldError::Invalid {
            message: message.into(),
        }
    }

    pub fn too_many_options(max_options: usize) -> Self {
        FieldError::invalid(format!("at most {} options are allowed", max_options))
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::RequiredFieldMissing => write!(f, "is required"),
            FieldError::KindMismatch { expected, got } => {
                write!(f, "expected a {} value, got {}", expected, got)
            }
            FieldError::Invalid { message } => write!(f, "{}", message),
        }
    }
}

/// Field-keyed error map returned for rejected submissions.
///
/// Keys are field definition ids for value submissions, or attribute names
/// (`name`, `options`, ...) for admin input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, Vec<FieldError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, error: FieldError) {
        self.fields.entry(key.into()).or_default().push(error);
    }

    pub fn extend_field(&mut self, key: impl Into<String>, errors: Vec<FieldError>) {
        if errors.is_empty() {
            return;
        }
        self.fields.entry(key.into()).or_default().extend(errors);
    }

    pub fn get(&self, key: &str) -> Option<&[FieldError]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// Errors recorded against a field definition id.
    pub fn for_field(&self, field_id: Uuid) -> Option<&[FieldError]> {
        self.get(&field_id.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Error::Validation`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(key, errors)| errors.iter().map(move |e| format!("{} {}", key, e)))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_type_not_found() {
        let id = Uuid::nil();
        let err = Error::TypeNotFound(id);
        assert_eq!(err.to_string(), format!("Type not found: {}", id));
    }

    #[test]
    fn test_error_display_dependency() {
        let err = Error::Dependency("type 'Investor' is assigned to 3 entities".to_string());
        assert_eq!(
            err.to_string(),
            "Cannot delete: type 'Investor' is assigned to 3 entities"
        );
    }

    #[test]
    fn test_validation_error_display_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.add("name", FieldError::RequiredFieldMissing);
        errors.add("options", FieldError::invalid("too many options"));
        let err = Error::Validation(errors);
        assert_eq!(
            err.to_string(),
            "Validation failed: name is required; options too many options"
        );
    }

    #[test]
    fn test_validation_errors_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("name", FieldError::RequiredFieldMissing);
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.validation_errors().map(|e| e.len()), Some(1));
    }

    #[test]
    fn test_validation_errors_keyed_by_field_id() {
        let id = Uuid::new_v4();
        let mut errors = ValidationErrors::new();
        errors.add(id.to_string(), FieldError::RequiredFieldMissing);
        assert_eq!(
            errors.for_field(id),
            Some(&[FieldError::RequiredFieldMissing][..])
        );
        assert!(errors.for_field(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_extend_field_ignores_empty() {
        let mut errors = ValidationErrors::new();
        errors.extend_field("name", vec![]);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_field_error_serializes_with_code() {
        let json = serde_json::to_value(FieldError::KindMismatch {
            expected: FieldKind::Currency,
            got: "text".to_string(),
        })
        .unwrap();
        assert_eq!(json["code"], "kind_mismatch");
        assert_eq!(json["expected"], "currency");
    }

    #[test]
    fn test_recoverable_classes() {
        assert!(Error::Dependency("x".into()).is_recoverable());
        assert!(Error::FieldNotFound(Uuid::nil()).is_recoverable());
        assert!(!Error::Internal("x".into()).is_recoverable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
