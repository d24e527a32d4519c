use std::path::Path;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::id::HashKind;

/// Settings for one layout stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Encoding applied when a record declares none, or one we don't know
    pub default_encoding: String,
    pub hash_kind: HashKind,
    /// Maximum distinct strings pooled per stream
    pub intern_capacity: usize,
    /// Longer strings are never pooled
    pub intern_max_len: usize,
    /// Rows buffered between the worker and the consumer
    pub channel_capacity: usize,
    /// Lay out working-tree and index placeholder rows above HEAD
    pub artificial_commits: bool,
    /// Most recent commit ids remembered for duplicate and ordering checks;
    /// unset remembers every id in the pass
    pub seen_window: Option<usize>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_encoding: "utf-8".to_string(),
            hash_kind: HashKind::Sha1,
            intern_capacity: 4096,
            intern_max_len: 256,
            channel_capacity: 1,
            artificial_commits: false,
            seen_window: None,
        }
    }
}

impl GraphConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.encoding()?;
        Ok(config)
    }

    /// Resolve `default_encoding` to a decoder
    pub fn encoding(&self) -> Result<&'static Encoding, ConfigError> {
        Encoding::for_label(self.default_encoding.as_bytes())
            .ok_or_else(|| ConfigError::UnknownEncoding(self.default_encoding.clone()))
    }
}
