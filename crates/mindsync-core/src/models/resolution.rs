//! Resolution strategies, the conflict lifecycle, and the resolution result.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clinical::ClinicalPayload;
use super::vector_clock::VectorClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    ServerWins,
    ClientWins,
    SmartMerge,
    TherapeuticPriority,
    CrisisOverride,
    TimestampBased,
    UserChoice,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
            Self::SmartMerge => "smart_merge",
            Self::TherapeuticPriority => "therapeutic_priority",
            Self::CrisisOverride => "crisis_override",
            Self::TimestampBased => "timestamp_based",
            Self::UserChoice => "user_choice",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a conflict record.
///
/// `pending -> analyzing -> {resolved_automatic | resolved_manual | escalated}`,
/// `analyzing -> pending` when a merge fails, and `failed` from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Pending,
    Analyzing,
    ResolvedAutomatic,
    ResolvedManual,
    Escalated,
    Failed,
}

impl ConflictStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ResolvedAutomatic | Self::ResolvedManual | Self::Escalated | Self::Failed
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Failed) => true,
            (Self::Pending, Self::Analyzing) => true,
            (
                Self::Analyzing,
                Self::Pending | Self::ResolvedAutomatic | Self::ResolvedManual | Self::Escalated,
            ) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::ResolvedAutomatic => "resolved_automatic",
            Self::ResolvedManual => "resolved_manual",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user's pick for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "choice", content = "value", rename_all = "snake_case")]
pub enum FieldChoice {
    Client,
    Server,
    Custom(serde_json::Value),
}

/// A user's decision on a conflict. Unlisted fields default to the server value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConflictChoice {
    pub field_choices: BTreeMap<String, FieldChoice>,
    /// Remember this choice for future conflicts of the same type and resource kind.
    #[serde(default)]
    pub remember_preference: Option<ResolutionStrategy>,
}

/// Which side (or rule) a resolved field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Client,
    Server,
    Merged,
    User,
    SafetyInvariant,
}

/// A field-level change the resolution made relative to the server value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub field: String,
    pub previous: serde_json::Value,
    pub value: serde_json::Value,
    pub source: ChangeSource,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpAction {
    ManualReviewRequired,
    ContactSupport,
    ClinicalValidation,
    NotifyUser,
    AwaitUserChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Automatic,
    User,
}

/// Outcome of a resolution attempt. Persisted to the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub conflict_id: String,
    pub resource_id: String,
    pub strategy: ResolutionStrategy,
    pub resolved: bool,
    pub resolved_data: Option<ClinicalPayload>,
    pub merged_clock: Option<VectorClock>,
    pub applied_changes: Vec<AppliedChange>,
    /// Advisory confidence in [0, 1].
    pub confidence: f64,
    pub data_loss: bool,
    pub lost_data: Option<serde_json::Map<String, serde_json::Value>>,
    pub therapeutic_data_preserved: bool,
    pub crisis_data_preserved: bool,
    pub priority_data_preserved: bool,
    pub validation_required: bool,
    pub follow_up_actions: Vec<FollowUpAction>,
    pub resolved_by: ResolvedBy,
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionResult {
    /// An unresolved result carrying follow-up actions; the conflict stays pending.
    pub fn unresolved(
        conflict_id: impl Into<String>,
        resource_id: impl Into<String>,
        strategy: ResolutionStrategy,
        follow_up_actions: Vec<FollowUpAction>,
        resolved_by: ResolvedBy,
    ) -> Self {
        Self {
            conflict_id: conflict_id.into(),
            resource_id: resource_id.into(),
            strategy,
            resolved: false,
            resolved_data: None,
            merged_clock: None,
            applied_changes: Vec::new(),
            confidence: 0.0,
            data_loss: false,
            lost_data: None,
            therapeutic_data_preserved: true,
            crisis_data_preserved: true,
            priority_data_preserved: true,
            validation_required: true,
            follow_up_actions,
            resolved_by,
            resolved_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [
            ConflictStatus::ResolvedAutomatic,
            ConflictStatus::ResolvedManual,
            ConflictStatus::Escalated,
            ConflictStatus::Failed,
        ] {
            assert!(!terminal.can_transition_to(ConflictStatus::Pending));
            assert!(!terminal.can_transition_to(ConflictStatus::Failed));
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(ConflictStatus::Pending.can_transition_to(ConflictStatus::Analyzing));
        assert!(!ConflictStatus::Pending.can_transition_to(ConflictStatus::ResolvedManual));
        assert!(ConflictStatus::Analyzing.can_transition_to(ConflictStatus::Pending));
        assert!(ConflictStatus::Analyzing.can_transition_to(ConflictStatus::Escalated));
        assert!(ConflictStatus::Pending.can_transition_to(ConflictStatus::Failed));
    }
}
