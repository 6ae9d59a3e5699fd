//! Tree configuration
//!
//! Plain data with serde support, so a configuration can be embedded in a
//! larger JSON document or loaded on its own with [`TreeConfig::from_json`]:
//!
//! ```json
//! { "hashFillFactor": 0.5, "prefilter": true, "maxTraceListCount": 5 }
//! ```

use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};

/// Default distinct-count ratio above which an equality split becomes a hash node
pub const DEFAULT_HASH_FILL_FACTOR: f64 = 0.25;

/// Default number of literal values listed per trace evidence entry
pub const DEFAULT_MAX_TRACE_LIST_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct TreeConfig {
    /// A CONTAINS split becomes a hash node when the ratio of distinct codes
    /// at the node to distinct codes in the whole dataset exceeds this value.
    /// Values of 1.0 or more disable hash nodes.
    pub hash_fill_factor: f64,
    /// Compute pre-filter bitsets at build time and check them before each walk
    pub prefilter: bool,
    pub max_trace_list_count: usize,
    /// Fill node labels in `find_with_paths`
    pub full_debug: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            hash_fill_factor: DEFAULT_HASH_FILL_FACTOR,
            prefilter: false,
            max_trace_list_count: DEFAULT_MAX_TRACE_LIST_COUNT,
            full_debug: false,
        }
    }
}

impl TreeConfig {
    /// Parse and validate a JSON configuration object; missing keys keep defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TreeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_hash_fill_factor(mut self, hash_fill_factor: f64) -> Self {
        self.hash_fill_factor = hash_fill_factor;
        self
    }

    pub fn with_prefilter(mut self, prefilter: bool) -> Self {
        self.prefilter = prefilter;
        self
    }

    pub fn with_max_trace_list_count(mut self, count: usize) -> Self {
        self.max_trace_list_count = count;
        self
    }

    pub fn with_full_debug(mut self, full_debug: bool) -> Self {
        self.full_debug = full_debug;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.hash_fill_factor.is_finite() || self.hash_fill_factor < 0.0 {
            return Err(TreeError::invalid_config(format!(
                "hashFillFactor must be a non-negative number, got {}",
                self.hash_fill_factor
            )));
        }
        if self.max_trace_list_count == 0 {
            return Err(TreeError::invalid_config(
                "maxTraceListCount must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.hash_fill_factor, 0.25);
        assert!(!config.prefilter);
        assert_eq!(config.max_trace_list_count, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = TreeConfig::from_json(r#"{"prefilter": true, "fullDebug": true}"#).unwrap();
        assert!(config.prefilter);
        assert!(config.full_debug);
        assert_eq!(config.hash_fill_factor, DEFAULT_HASH_FILL_FACTOR);
    }

    #[test]
    fn test_from_json_rejects_unknown_and_invalid() {
        assert!(matches!(
            TreeConfig::from_json(r#"{"hashFill": 1}"#),
            Err(TreeError::ConfigParse(_))
        ));
        assert!(matches!(
            TreeConfig::from_json(r#"{"hashFillFactor": -0.5}"#),
            Err(TreeError::InvalidConfig { .. })
        ));
        assert!(matches!(
            TreeConfig::from_json(r#"{"maxTraceListCount": 0}"#),
            Err(TreeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(TreeConfig::default().with_prefilter(true)).unwrap();
        assert_eq!(json["prefilter"], true);
        assert_eq!(json["maxTraceListCount"], 10);
    }
}
