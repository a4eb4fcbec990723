//! # rapport-core
//!
//! Core types, traits, and the custom-field schema engine for rapport.
//!
//! Teams define types for contacts, companies and employees and attach typed
//! field definitions to them. This crate validates, encodes and projects the
//! values entities hold for those fields. Storage backends implement the
//! repository traits; `rapport-db` provides PostgreSQL and [`memory`] an
//! in-process store.

pub mod codec;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod memory;
pub mod models;
pub mod projection;
pub mod registry;
pub mod service;
pub mod templates;
pub mod traits;
pub mod validation;

// Re-export commonly used types at crate root
pub use codec::FieldData;
pub use config::SchemaLimits;
pub use error::{Error, FieldError, Result, ValidationErrors};
pub use models::*;
pub use projection::{ProjectedField, TypeGroup};
pub use registry::{FieldKindRegistry, FieldKindSpec, InputKind, ValueShape};
pub use service::CustomFields;
pub use templates::{TemplateField, TypeTemplate};
pub use traits::*;
pub use validation::{ValidationResult, Validator};
