//! Local mutations, as they travel between devices.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clinical::ClinicalPayload;
use super::device::DeviceId;
use super::vector_clock::VectorClock;

/// Scheduling priority. Total order by numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityLevel {
    CrisisEmergency,
    ClinicalCritical,
    TherapeuticHigh,
    UserMedium,
    SyncLow,
    CleanupMinimal,
}

impl PriorityLevel {
    pub fn value(self) -> u16 {
        match self {
            Self::CrisisEmergency => 1000,
            Self::ClinicalCritical => 800,
            Self::TherapeuticHigh => 600,
            Self::UserMedium => 400,
            Self::SyncLow => 200,
            Self::CleanupMinimal => 100,
        }
    }
}

impl PartialOrd for PriorityLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value().cmp(&other.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    /// Supersede the record. Clinical records are never physically deleted.
    Tombstone,
}

/// The kind of resource an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Assessment,
    CrisisPlan,
    SessionProgress,
    UserPreference,
    Payment,
    Subscription,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::CrisisPlan => "crisis_plan",
            Self::SessionProgress => "session_progress",
            Self::UserPreference => "user_preference",
            Self::Payment => "payment",
            Self::Subscription => "subscription",
        }
    }

    pub fn is_billing(self) -> bool {
        matches!(self, Self::Payment | Self::Subscription)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the user (or the app on their behalf) produced the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIntent {
    Record,
    Correct,
    Review,
    BackgroundSync,
}

/// An immutable mutation tagged with the producing device's clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub entity_type: EntityType,
    /// Id of the replicated resource this operation targets.
    pub resource_id: String,
    pub operation_data: ClinicalPayload,
    pub device_id: DeviceId,
    pub timestamp: DateTime<Utc>,
    pub vector_clock: VectorClock,
    pub user_intent: UserIntent,
    pub priority_level: PriorityLevel,
    /// Raised by the crisis flow (e.g. safety plan opened from a crisis screen).
    #[serde(default)]
    pub crisis_flag: bool,
    /// Skip normal sync queuing.
    #[serde(default)]
    pub bypass_queue: bool,
}

impl Operation {
    /// A new operation with a fresh id, stamped now.
    pub fn new(
        operation_type: OperationType,
        entity_type: EntityType,
        resource_id: impl Into<String>,
        operation_data: ClinicalPayload,
        device_id: impl Into<DeviceId>,
        vector_clock: VectorClock,
        priority_level: PriorityLevel,
    ) -> Self {
        Self {
            operation_id: uuid::Uuid::new_v4().to_string(),
            operation_type,
            entity_type,
            resource_id: resource_id.into(),
            operation_data,
            device_id: device_id.into(),
            timestamp: Utc::now(),
            vector_clock,
            user_intent: UserIntent::Record,
            priority_level,
            crisis_flag: false,
            bypass_queue: false,
        }
    }

    /// Flagged, crisis priority, or carrying a safety plan.
    pub fn is_crisis(&self) -> bool {
        self.crisis_flag
            || self.priority_level == PriorityLevel::CrisisEmergency
            || self.operation_data.is_crisis()
    }
}
