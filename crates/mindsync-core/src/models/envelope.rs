//! Versioned wire wrapper for state crossing the device boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::crdt_state::CrdtState;
use super::device::DeviceId;
use super::operation::Operation;
use crate::errors::{MindSyncResult, TransportError};

/// Current envelope protocol version.
pub const PROTOCOL_VERSION: &str = "1.0";

/// What the transport carries between devices: a CRDT snapshot and, when the
/// snapshot was produced by a local mutation, the operation itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub protocol_version: String,
    /// Unique per send. Retries of the same send reuse it.
    pub envelope_id: String,
    pub source_device: DeviceId,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub operation: Option<Operation>,
    pub state: CrdtState,
}

impl SyncEnvelope {
    pub fn new(source_device: DeviceId, state: CrdtState, operation: Option<Operation>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            envelope_id: uuid::Uuid::new_v4().to_string(),
            source_device,
            sent_at: Utc::now(),
            operation,
            state,
        }
    }

    /// Id used for replay detection: the operation id when present, the
    /// envelope id otherwise.
    pub fn dedup_key(&self) -> &str {
        self.operation
            .as_ref()
            .map(|op| op.operation_id.as_str())
            .unwrap_or(&self.envelope_id)
    }

    pub fn encode(&self) -> MindSyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and check the protocol version.
    pub fn decode(bytes: &[u8]) -> MindSyncResult<Self> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|e| TransportError::MalformedEnvelope {
                details: e.to_string(),
            })?;
        if envelope.protocol_version != PROTOCOL_VERSION {
            return Err(TransportError::UnsupportedVersion {
                expected: PROTOCOL_VERSION.to_string(),
                found: envelope.protocol_version,
            }
            .into());
        }
        Ok(envelope)
    }
}
