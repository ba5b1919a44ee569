//! Constraint-aware CRDTs for each clinical payload type.
//!
//! Each type owns a [`CrdtState`] whose payload variant matches the type.
//! [`ClinicalCrdt`] dispatches over the closed set of variants.

mod assessment;
mod common;
mod crisis_plan;
mod dispatch;
mod preference;
mod session_progress;

pub use assessment::{assessment_accuracy, AssessmentScoreCrdt};
pub use crisis_plan::{enforce_safety_invariants, CrisisPlanCrdt};
pub use dispatch::ClinicalCrdt;
pub use preference::UserPreferenceCrdt;
pub use session_progress::SessionProgressCrdt;

use mindsync_core::errors::MindSyncResult;
use mindsync_core::models::{
    AuditEntry, ConstraintValidationResult, CrdtState, Operation,
};
use serde::{Deserialize, Serialize};

/// Which input supplied the merged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeWinner {
    Local,
    Remote,
    /// Both sides contributed (unions, counters, per-key registers).
    Combined,
}

/// Outcome of merging a remote snapshot into a local one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub state: CrdtState,
    pub winner: MergeWinner,
    /// Human-readable notes on what the merge decided. Never contains payload values.
    pub notes: Vec<String>,
}

/// Outcome of applying one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Snapshot after the operation (unchanged for duplicates).
    pub state: CrdtState,
    pub applied: bool,
    /// The operation id had already been folded in; nothing changed.
    pub duplicate: bool,
    pub validation: ConstraintValidationResult,
    /// The new snapshot should be pushed to peers now rather than lazily.
    pub propagation_required: bool,
    pub audit_entry: Option<AuditEntry>,
}

impl OperationResult {
    pub(crate) fn duplicate(state: CrdtState) -> Self {
        Self {
            state,
            applied: false,
            duplicate: true,
            validation: ConstraintValidationResult::passed(),
            propagation_required: false,
            audit_entry: None,
        }
    }
}

/// A replicated clinical record with therapeutic constraints.
pub trait TherapeuticCrdt: Sized {
    /// Wrap a snapshot. Fails when the payload variant does not match the type.
    fn from_state(state: CrdtState) -> MindSyncResult<Self>;

    /// Commutative merge: `a.merge(b)` and `b.merge(a)` converge.
    fn merge(&self, remote: &Self) -> MindSyncResult<MergeResult>;

    /// Check an operation against the record's constraints. Never mutates.
    fn validate_therapeutic_constraints(&self, op: &Operation) -> ConstraintValidationResult;

    /// Apply an operation, failing closed on blocking violations.
    fn apply_operation(&mut self, op: &Operation) -> MindSyncResult<OperationResult>;

    fn current_state(&self) -> &CrdtState;

    fn into_state(self) -> CrdtState;
}
