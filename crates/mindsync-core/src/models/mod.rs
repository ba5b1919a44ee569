//! Shared data model. Logic lives in the crdt, conflict, and sync crates.

pub mod audit;
pub mod clinical;
pub mod conflict;
pub mod constraints;
pub mod crdt_state;
pub mod device;
pub mod envelope;
pub mod operation;
pub mod resolution;
pub mod vector_clock;

pub use audit::{AuditAction, AuditEntry, ConflictAnalytics};
pub use clinical::{
    AssessmentScore, AssessmentType, ClinicalPayload, ClinicalType, CrisisSafetyPlan,
    EmergencyContact, PrecedenceTier, PreferenceEntry, SessionProgress, UserPreference,
};
pub use conflict::{
    ClientSnapshot, ConflictDescription, ConflictSeverity, ConflictType, ConflictUrgency,
    CrisisContext, FieldConflict, FieldPriority, MergeRule, ServerSnapshot, TherapeuticContext,
};
pub use constraints::{
    ConstraintValidationResult, ConstraintViolation, RiskLevel, TherapeuticConstraintKind,
    TherapeuticConstraints,
};
pub use crdt_state::{ClinicalMetadata, CrdtKind, CrdtState};
pub use device::DeviceId;
pub use envelope::{SyncEnvelope, PROTOCOL_VERSION};
pub use operation::{EntityType, Operation, OperationType, PriorityLevel, UserIntent};
pub use resolution::{
    AppliedChange, ChangeSource, ConflictStatus, FieldChoice, FollowUpAction, ResolutionResult,
    ResolutionStrategy, ResolvedBy, UserConflictChoice,
};
pub use vector_clock::VectorClock;
