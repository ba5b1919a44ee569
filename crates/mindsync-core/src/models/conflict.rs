//! Conflict classification produced by detection and consumed by resolution.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clinical::{ClinicalPayload, ClinicalType, PrecedenceTier};
use super::device::DeviceId;
use super::operation::{EntityType, PriorityLevel};
use super::resolution::{ConflictStatus, ResolutionStrategy};
use super::vector_clock::VectorClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    CrisisStateConflict,
    TherapeuticDataConflict,
    PaymentStateConflict,
    SubscriptionTierConflict,
    DeletedOnServer,
    SchemaMismatch,
    PermissionChanged,
    DataVersionConflict,
    SimultaneousModification,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrisisStateConflict => "crisis_state_conflict",
            Self::TherapeuticDataConflict => "therapeutic_data_conflict",
            Self::PaymentStateConflict => "payment_state_conflict",
            Self::SubscriptionTierConflict => "subscription_tier_conflict",
            Self::DeletedOnServer => "deleted_on_server",
            Self::SchemaMismatch => "schema_mismatch",
            Self::PermissionChanged => "permission_changed",
            Self::DataVersionConflict => "data_version_conflict",
            Self::SimultaneousModification => "simultaneous_modification",
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictUrgency {
    Low,
    Medium,
    High,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// How a mergeable field combines its two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Union of array elements, client order first.
    ArrayUnion,
    /// Union of object keys; shared numeric keys keep the max, otherwise client.
    ObjectMerge,
    /// Server text, separator, client text.
    TextConcatenate,
    /// Larger number wins.
    Maximum,
    PreferClient,
    PreferServer,
    /// Not auto-mergeable.
    None,
}

impl MergeRule {
    pub fn is_mergeable(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// One field that differs between the two sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub client_value: serde_json::Value,
    pub server_value: serde_json::Value,
    pub mergeable: bool,
    pub merge_rule: MergeRule,
    pub priority: FieldPriority,
    pub therapeutic_impact: bool,
}

/// Crisis impact of a conflict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrisisContext {
    pub involves_crisis_data: bool,
    /// Forces the crisis override strategy.
    pub requires_immediate: bool,
    pub safety_fields: Vec<String>,
}

/// Therapeutic impact of a conflict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TherapeuticContext {
    pub session_active: bool,
    pub involves_assessment: bool,
    pub therapeutic_fields: Vec<String>,
}

/// The local side of a conflict: the operation the storage layer rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub operation_id: String,
    pub device_id: DeviceId,
    pub payload: ClinicalPayload,
    pub vector_clock: VectorClock,
    pub priority_level: PriorityLevel,
    pub timestamp: DateTime<Utc>,
}

/// The stored side of a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub payload: Option<ClinicalPayload>,
    pub vector_clock: VectorClock,
    pub version: u64,
    pub tombstoned: bool,
    pub last_writer: Option<DeviceId>,
}

/// Full description of a detected divergence on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDescription {
    pub conflict_id: String,
    pub resource_id: String,
    pub resource_type: EntityType,
    pub clinical_type: ClinicalType,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub urgency: ConflictUrgency,
    pub precedence_tier: PrecedenceTier,
    pub field_conflicts: Vec<FieldConflict>,
    pub recommended_strategy: ResolutionStrategy,
    pub auto_resolution_possible: bool,
    pub crisis_context: CrisisContext,
    pub therapeutic_context: TherapeuticContext,
    pub client: ClientSnapshot,
    pub server: ServerSnapshot,
    pub status: ConflictStatus,
    pub detected_at: DateTime<Utc>,
    pub resolution_deadline: DateTime<Utc>,
}

impl ConflictDescription {
    /// The deadline is advisory; passing it never discards the conflict.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.resolution_deadline
    }

    pub fn requires_user_input(&self) -> bool {
        self.recommended_strategy == ResolutionStrategy::UserChoice
    }

    pub fn mergeable_field_count(&self) -> usize {
        self.field_conflicts.iter().filter(|f| f.mergeable).count()
    }

    /// A critical field that is both non-mergeable and therapeutic.
    pub fn has_unmergeable_critical_therapeutic_field(&self) -> bool {
        self.field_conflicts.iter().any(|f| {
            f.priority == FieldPriority::Critical && !f.mergeable && f.therapeutic_impact
        })
    }
}
