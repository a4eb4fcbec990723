//! Centralized default constants for rapport.
//!
//! **This module is the single source of truth** for shared default values.
//! Runtime overrides go through [`crate::config::SchemaLimits`].

// =============================================================================
// NAMES & DESCRIPTIONS
// =============================================================================

/// Maximum characters in a type or field name.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum characters in a type or field description.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

// =============================================================================
// CHOICE OPTIONS
// =============================================================================

/// Maximum number of options on a single choice field.
pub const MAX_OPTIONS: usize = 500;

/// Maximum characters in a single option label.
pub const MAX_OPTION_LEN: usize = 200;

// =============================================================================
// TYPE STYLING
// =============================================================================

/// Icon assigned when a type is created without one.
pub const TYPE_ICON: &str = "tag";

/// Color assigned when a type is created without one.
pub const TYPE_COLOR: &str = "#6B7280";

// =============================================================================
// VALUE FORMATS
// =============================================================================

/// Calendar-date representation used for stored date payloads.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Minimum digit count for a phone value to pass format checks.
pub const PHONE_MIN_DIGITS: usize = 7;

/// Separator used when rendering multi-select values for display.
pub const MULTI_SELECT_DISPLAY_SEPARATOR: &str = ", ";

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Env var overriding [`MAX_NAME_LEN`].
pub const ENV_MAX_NAME_LEN: &str = "RAPPORT_MAX_NAME_LEN";

/// Env var overriding [`MAX_DESCRIPTION_LEN`].
pub const ENV_MAX_DESCRIPTION_LEN: &str = "RAPPORT_MAX_DESCRIPTION_LEN";

/// Env var overriding [`MAX_OPTIONS`].
pub const ENV_MAX_OPTIONS: &str = "RAPPORT_MAX_OPTIONS";

/// Env var overriding [`MAX_OPTION_LEN`].
pub const ENV_MAX_OPTION_LEN: &str = "RAPPORT_MAX_OPTION_LEN";
