//! Runtime limits for schema objects.
//!
//! Limits default to the constants in [`crate::defaults`] and can be
//! overridden per process through `RAPPORT_*` environment variables.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::defaults;
use crate::error::{Error, Result};

/// Size limits enforced on admin input (names, descriptions, options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLimits {
    pub max_name_len: usize,
    pub max_description_len: usize,
    pub max_options: usize,
    pub max_option_len: usize,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            max_name_len: defaults::MAX_NAME_LEN,
            max_description_len: defaults::MAX_DESCRIPTION_LEN,
            max_options: defaults::MAX_OPTIONS,
            max_option_len: defaults::MAX_OPTION_LEN,
        }
    }
}

impl SchemaLimits {
    /// Load limits from the environment, falling back to defaults for
    /// unset or unparsable values.
    pub fn from_env() -> Self {
        let base = Self::default();
        let limits = Self {
            max_name_len: env_usize(defaults::ENV_MAX_NAME_LEN, base.max_name_len),
            max_description_len: env_usize(
                defaults::ENV_MAX_DESCRIPTION_LEN,
                base.max_description_len,
            ),
            max_options: env_usize(defaults::ENV_MAX_OPTIONS, base.max_options),
            max_option_len: env_usize(defaults::ENV_MAX_OPTION_LEN, base.max_option_len),
        };
        debug!(
            subsystem = "core",
            component = "config",
            max_name_len = limits.max_name_len,
            max_options = limits.max_options,
            "Schema limits loaded"
        );
        limits
    }

    /// Set the maximum name length.
    pub fn max_name_len(mut self, n: usize) -> Self {
        self.max_name_len = n;
        self
    }

    /// Set the maximum number of options per choice field.
    pub fn max_options(mut self, n: usize) -> Self {
        self.max_options = n;
        self
    }

    /// Set the maximum option label length.
    pub fn max_option_len(mut self, n: usize) -> Self {
        self.max_option_len = n;
        self
    }

    /// Reject limits that would make every input invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_name_len == 0 {
            return Err(Error::Config("max_name_len must be at least 1".into()));
        }
        if self.max_option_len == 0 {
            return Err(Error::Config("max_option_len must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_usize(key: &str, fallback: usize) -> usize {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    subsystem = "core",
                    component = "config",
                    key,
                    value = %raw,
                    fallback,
                    "Ignoring unparsable limit override"
                );
                fallback
            }
        },
        Err(_) => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let limits = SchemaLimits::default();
        assert_eq!(limits.max_name_len, defaults::MAX_NAME_LEN);
        assert_eq!(limits.max_options, defaults::MAX_OPTIONS);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let limits = SchemaLimits::default().max_name_len(10).max_options(3);
        assert_eq!(limits.max_name_len, 10);
        assert_eq!(limits.max_options, 3);
    }

    #[test]
    fn test_zero_name_len_rejected() {
        let limits = SchemaLimits::default().max_name_len(0);
        assert!(matches!(limits.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_usize_fallback_on_garbage() {
        // Unique key so parallel tests do not interfere.
        let key = "RAPPORT_TEST_ENV_USIZE_GARBAGE";
        env::set_var(key, "lots");
        assert_eq!(env_usize(key, 7), 7);
        env::set_var(key, " 12 ");
        assert_eq!(env_usize(key, 7), 12);
        env::remove_var(key);
        assert_eq!(env_usize(key, 7), 7);
    }
}
