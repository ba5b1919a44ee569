use crate::models::constraints::TherapeuticConstraintKind;

/// A therapeutic constraint rejected an operation. Nothing is applied.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("constraint {constraint} violated on {resource_id}: {message}")]
    ConstraintViolated {
        resource_id: String,
        constraint: TherapeuticConstraintKind,
        message: String,
    },

    #[error("payload mismatch on {resource_id}: expected {expected}, found {found}")]
    PayloadMismatch {
        resource_id: String,
        expected: String,
        found: String,
    },

    #[error("resource {resource_id} is tombstoned")]
    Tombstoned { resource_id: String },
}
