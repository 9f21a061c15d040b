// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket model configuration, stored as RON.

use crate::value::Role;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Error loading or saving a [`GraphConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON for this configuration
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The configuration could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),
}

/// Tunables of the socket model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Roles propagated along edges (empty means `Display`)
    pub connected_roles: Vec<Role>,
    /// Changed ranges larger than this (and than the edge count) scan edges
    /// instead of rows
    pub range_scan_threshold: usize,
    /// Upper bound on notification rounds drained per call
    pub max_propagation_rounds: usize,
    /// Whether a node may connect to itself
    pub allow_self_connections: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            connected_roles: Vec::new(),
            range_scan_threshold: 64,
            max_propagation_rounds: 32,
            allow_self_connections: true,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from RON text
    pub fn from_ron_str(s: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(s)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_ron_str(&content)?;
        tracing::info!("Loaded socket model config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Save this configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }
}
