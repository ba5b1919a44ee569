//! # mindsync-conflict
//!
//! Classifies divergence between a rejected local operation and the stored
//! snapshot ([`ConflictDetector`]), resolves it under the fixed safety
//! precedence ([`ResolutionStrategyEngine`]), and tracks each conflict
//! through its lifecycle ([`ConflictRecord`]).

pub mod detector;
pub mod merge_rules;
pub mod resolution;
pub mod schema;
pub mod state_machine;

pub use detector::ConflictDetector;
pub use resolution::ResolutionStrategyEngine;
pub use schema::{field_spec, schema_for, ClinicalSchema, FieldSpec};
pub use state_machine::{ConflictRecord, StatusChange};
