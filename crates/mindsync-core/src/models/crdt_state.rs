//! Snapshot of one replicated therapeutic record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::clinical::{ClinicalPayload, ClinicalType};
use super::constraints::TherapeuticConstraints;
use super::device::DeviceId;
use super::vector_clock::VectorClock;

/// Replicated data type family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrdtKind {
    LwwRegister,
    GCounter,
    PnCounter,
    GSet,
    OrSet,
    TherapeuticMap,
}

impl CrdtKind {
    /// The kind used for each clinical type.
    pub fn for_clinical_type(clinical_type: ClinicalType) -> Self {
        match clinical_type {
            ClinicalType::AssessmentScore | ClinicalType::CrisisSafetyPlan => Self::LwwRegister,
            ClinicalType::SessionProgress | ClinicalType::UserPreference => Self::TherapeuticMap,
        }
    }
}

/// Clinical context attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalMetadata {
    pub clinical_type: ClinicalType,
    /// Computed clinical accuracy in [0, 1].
    pub clinical_accuracy: f64,
    pub safety_implications: BTreeSet<String>,
    pub requires_audit: bool,
    pub validated: bool,
}

impl ClinicalMetadata {
    pub fn new(clinical_type: ClinicalType) -> Self {
        Self {
            clinical_type,
            clinical_accuracy: 1.0,
            safety_implications: BTreeSet::new(),
            requires_audit: clinical_type.precedence_tier().validation_required(),
            validated: false,
        }
    }
}

/// One record's replicated state: value, causal history, and the constraints
/// every merge must honor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtState {
    pub id: String,
    pub kind: CrdtKind,
    pub value: ClinicalPayload,
    pub vector_clock: VectorClock,
    pub constraints: TherapeuticConstraints,
    pub clinical_metadata: ClinicalMetadata,
    /// Device that produced the current value. Used as a deterministic tie-break.
    pub last_writer: DeviceId,
    /// Operation ids already folded into this state (replay detection).
    #[serde(default)]
    pub applied_operations: BTreeSet<String>,
    /// Superseded records are kept for audit history, never removed.
    #[serde(default)]
    pub tombstoned: bool,
}

impl CrdtState {
    /// A fresh record created on `device`.
    pub fn new(id: impl Into<String>, value: ClinicalPayload, device: impl Into<DeviceId>) -> Self {
        let clinical_type = value.clinical_type();
        Self {
            id: id.into(),
            kind: CrdtKind::for_clinical_type(clinical_type),
            value,
            vector_clock: VectorClock::new(),
            constraints: TherapeuticConstraints::default(),
            clinical_metadata: ClinicalMetadata::new(clinical_type),
            last_writer: device.into(),
            applied_operations: BTreeSet::new(),
            tombstoned: false,
        }
    }

    pub fn clinical_type(&self) -> ClinicalType {
        self.value.clinical_type()
    }

    pub fn has_applied(&self, operation_id: &str) -> bool {
        self.applied_operations.contains(operation_id)
    }

    /// Same value and same causal history, regardless of local bookkeeping
    /// such as wall-clock timestamps on the clock.
    pub fn converged_with(&self, other: &Self) -> bool {
        self.value == other.value
            && self.vector_clock.same_causal_history(&other.vector_clock)
            && self.tombstoned == other.tombstoned
            && self.applied_operations == other.applied_operations
    }
}
