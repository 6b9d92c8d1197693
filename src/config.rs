//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Environment variable controlling [`EngineConfig::validate_tag_names`].
pub const VALIDATE_TAG_NAMES_ENV: &str = "VERSIONING_VALIDATE_TAG_NAMES";

/// Behaviour switches for [`VersioningEngine`](crate::VersioningEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reject tag names that do not match
    /// [`TAG_NAME_PATTERN`](crate::types::TAG_NAME_PATTERN) (default: false,
    /// any string is a valid name).
    pub validate_tag_names: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_tag_names: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            validate_tag_names: std::env::var(VALIDATE_TAG_NAMES_ENV)
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.validate_tag_names),
        }
    }

    /// Builder-style override of [`EngineConfig::validate_tag_names`].
    pub fn with_tag_validation(mut self, enabled: bool) -> Self {
        self.validate_tag_names = enabled;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
