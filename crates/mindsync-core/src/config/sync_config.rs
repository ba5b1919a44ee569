use serde::{Deserialize, Serialize};

use crate::constants::AUDIT_LOG_CAPACITY;

/// Coordinator and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Identifier of the device this engine runs on. Default: "local-device".
    pub device_id: String,
    /// Audit entries retained per namespace. Default: 100.
    pub audit_log_capacity: usize,
    /// Compare-and-swap retries when a remote merge races a local write. Default: 1.
    pub max_cas_retries: u32,
    /// Operation ids remembered for replay detection. Default: 10_000.
    pub processed_operation_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_id: "local-device".to_string(),
            audit_log_capacity: AUDIT_LOG_CAPACITY,
            max_cas_retries: 1,
            processed_operation_capacity: 10_000,
        }
    }
}
