//! Append-only audit trail entries and non-identifying conflict analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conflict::{ConflictDescription, ConflictSeverity, ConflictType, ConflictUrgency};
use super::constraints::RiskLevel;
use super::device::DeviceId;
use super::resolution::{ResolutionResult, ResolutionStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    OperationApplied,
    OperationTombstoned,
    RemoteMerged,
    ConflictDetected,
    ConflictResolved,
    ConflictEscalated,
}

/// One audit trail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: String,
    pub resource_id: String,
    pub action: AuditAction,
    pub device_id: DeviceId,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub conflict_id: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub resolution: Option<ResolutionResult>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(resource_id: impl Into<String>, action: AuditAction, device_id: DeviceId) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            action,
            device_id,
            operation_id: None,
            conflict_id: None,
            risk_level: RiskLevel::None,
            resolution: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_operation(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = Some(operation_id.into());
        self
    }

    pub fn with_risk(mut self, risk_level: RiskLevel) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_resolution(mut self, resolution: ResolutionResult) -> Self {
        self.conflict_id = Some(resolution.conflict_id.clone());
        self.resolution = Some(resolution);
        self
    }
}

/// Analytics view of a resolved conflict. Carries no payload values and
/// replaces the resource id with a blake3 digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalytics {
    pub resource_digest: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub urgency: ConflictUrgency,
    pub strategy: ResolutionStrategy,
    pub field_count: usize,
    pub confidence: f64,
    pub data_loss: bool,
    pub resolution_millis: i64,
}

impl ConflictAnalytics {
    pub fn from_resolution(conflict: &ConflictDescription, result: &ResolutionResult) -> Self {
        Self {
            resource_digest: blake3::hash(conflict.resource_id.as_bytes())
                .to_hex()
                .to_string(),
            conflict_type: conflict.conflict_type,
            severity: conflict.severity,
            urgency: conflict.urgency,
            strategy: result.strategy,
            field_count: conflict.field_conflicts.len(),
            confidence: result.confidence,
            data_loss: result.data_loss,
            resolution_millis: (result.resolved_at - conflict.detected_at).num_milliseconds(),
        }
    }
}
