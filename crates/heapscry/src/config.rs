//! Decode configuration.
//!
//! Every field has a default matching the observed image format, so an empty
//! JSON object (or no config file at all) is a valid configuration.

use crate::error::{DecodeError, DecodeResult};
use poolfmt::PoolFlags;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker that starts the schema metadata after the dependency message: the
/// serialized descriptor's name field.
pub const DEFAULT_MESSAGE_MARKER: &str = "\n\x12dependencies.proto";

fn default_corrupted_flag() -> u64 {
    PoolFlags::IS_CORRUPTED
}

fn default_interesting_flag() -> u64 {
    PoolFlags::IS_INTERESTING
}

fn default_message_marker() -> String {
    DEFAULT_MESSAGE_MARKER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Flag mask selecting nodes that carry encrypted chunks.
    #[serde(default = "default_corrupted_flag")]
    pub corrupted_flag: u64,
    /// Flag mask selecting nodes that carry hints.
    #[serde(default = "default_interesting_flag")]
    pub interesting_flag: u64,
    /// Literal substring ending the dependency message inside the blob.
    #[serde(default = "default_message_marker")]
    pub message_marker: String,
    /// Optional cap on list length; can only lower the size-derived bound.
    #[serde(default)]
    pub max_nodes: Option<usize>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            corrupted_flag: default_corrupted_flag(),
            interesting_flag: default_interesting_flag(),
            message_marker: default_message_marker(),
            max_nodes: None,
        }
    }
}

impl DecodeConfig {
    /// Parse from JSON text.
    pub fn from_json_str(json: &str) -> DecodeResult<Self> {
        let config: DecodeConfig =
            serde_json::from_str(json).map_err(|e| DecodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> DecodeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
            .map_err(|e| DecodeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> DecodeResult<()> {
        if self.corrupted_flag == 0 || self.interesting_flag == 0 {
            return Err(DecodeError::Config("flag masks must be non-zero".into()));
        }
        if self.message_marker.is_empty() {
            return Err(DecodeError::Config("message_marker must not be empty".into()));
        }
        if self.max_nodes == Some(0) {
            return Err(DecodeError::Config("max_nodes must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = DecodeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DecodeConfig::default());
        assert_eq!(config.corrupted_flag, 0x2);
        assert_eq!(config.interesting_flag, 0x4);
    }

    #[test]
    fn test_overrides() {
        let config = DecodeConfig::from_json_str(
            r#"{ "corrupted_flag": 8, "message_marker": "END", "max_nodes": 10 }"#,
        )
        .unwrap();
        assert_eq!(config.corrupted_flag, 8);
        assert_eq!(config.message_marker, "END");
        assert_eq!(config.max_nodes, Some(10));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DecodeConfig::from_json_str(r#"{ "corrupted_flag": 0 }"#).is_err());
        assert!(DecodeConfig::from_json_str(r#"{ "message_marker": "" }"#).is_err());
        assert!(DecodeConfig::from_json_str(r#"{ "max_nodes": 0 }"#).is_err());
        assert!(DecodeConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(br#"{ "interesting_flag": 16 }"#).unwrap();
        tmp.flush().unwrap();

        let config = DecodeConfig::from_json_file(tmp.path()).unwrap();
        assert_eq!(config.interesting_flag, 16);
    }
}
