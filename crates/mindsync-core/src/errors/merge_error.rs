/// A merge or resolution could not run on the inputs it was given.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("shape mismatch for {resource_id}: {details}")]
    ShapeMismatch { resource_id: String, details: String },

    #[error("conflict {conflict_id} requires an explicit user choice")]
    UserChoiceRequired { conflict_id: String },

    #[error("resolved payload for {resource_id} could not be rebuilt: {reason}")]
    RebuildFailed { resource_id: String, reason: String },
}
