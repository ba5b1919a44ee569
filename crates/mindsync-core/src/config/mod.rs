//! Engine configuration, loaded from TOML. Every field has a default.

mod observability_config;
mod resolution_config;
mod sync_config;

pub use observability_config::ObservabilityConfig;
pub use resolution_config::ResolutionConfig;
pub use sync_config::SyncConfig;

use serde::{Deserialize, Serialize};

use crate::errors::{MindSyncError, MindSyncResult};

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MindSyncConfig {
    pub resolution: ResolutionConfig,
    pub sync: SyncConfig,
    pub observability: ObservabilityConfig,
}

impl MindSyncConfig {
    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml(input: &str) -> MindSyncResult<Self> {
        toml::from_str(input).map_err(|e| MindSyncError::ConfigError(e.to_string()))
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> MindSyncResult<String> {
        toml::to_string(self).map_err(|e| MindSyncError::ConfigError(e.to_string()))
    }
}
