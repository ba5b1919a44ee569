//! # mindsync-crdt
//!
//! Vector clock management, CRDT primitives, and the typed therapeutic CRDT
//! family (assessment scores, crisis plans, session progress, preferences).
//!
//! Every merge here is commutative: merging `a` into `b` converges to the same
//! value and causal history as merging `b` into `a`.

pub mod clock;
pub mod primitives;
pub mod therapeutic;

pub use clock::{ClockResolutionStrategy, VectorClockManager, VectorClockResolution};
pub use primitives::{GCounter, GSet, LWWRegister};
pub use therapeutic::{
    assessment_accuracy, enforce_safety_invariants, AssessmentScoreCrdt, ClinicalCrdt, CrisisPlanCrdt, MergeResult, MergeWinner, OperationResult,
    SessionProgressCrdt, TherapeuticCrdt, UserPreferenceCrdt,
};
