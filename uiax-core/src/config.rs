//! Finder configuration.
//!
//! [`FinderConfig`] is plain data with serde support so the FFI and Python
//! layers can pass it across as a JSON object.  Every field has a default;
//! unknown keys are rejected.

use serde::{Deserialize, Serialize};

/// Default cap on `all_applications` results.
pub const DEFAULT_MAX_APPLICATIONS: usize = 100;

/// Default cap on children materialized per node, so a grid with 100k
/// cells cannot exhaust memory.
pub const DEFAULT_MAX_CHILDREN: usize = 512;

/// Tunables shared by the finder and its platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FinderConfig {
    /// Maximum number of applications returned by `all_applications`.
    pub max_applications: usize,
    /// Maximum number of children loaded for a single element.
    pub max_children: usize,
    /// Ask the OS to show its accessibility-trust prompt when untrusted.
    pub prompt_for_trust: bool,
    /// Attach a `process_name` attribute to application elements.
    pub annotate_process_names: bool,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            max_applications: DEFAULT_MAX_APPLICATIONS,
            max_children: DEFAULT_MAX_CHILDREN,
            prompt_for_trust: true,
            annotate_process_names: true,
        }
    }
}

impl FinderConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = FinderConfig::default();
        assert_eq!(cfg.max_applications, 100);
        assert_eq!(cfg.max_children, 512);
        assert!(cfg.prompt_for_trust);
        assert!(cfg.annotate_process_names);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = FinderConfig::from_json(r#"{"max_children": 32}"#).unwrap();
        assert_eq!(cfg.max_children, 32);
        assert_eq!(cfg.max_applications, DEFAULT_MAX_APPLICATIONS);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(FinderConfig::from_json("  ").unwrap(), FinderConfig::default());
        assert_eq!(FinderConfig::from_json("{}").unwrap(), FinderConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(FinderConfig::from_json(r#"{"max_depth": 3}"#).is_err());
    }
}
