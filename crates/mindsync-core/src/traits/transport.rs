use std::future::Future;

use crate::errors::MindSyncResult;
use crate::models::SyncEnvelope;

/// Cross-device delivery collaborator. Delivery is at-least-once, so receivers
/// must treat replays of the same envelope as no-ops.
pub trait ITransport: Send + Sync {
    fn push(&self, envelope: &SyncEnvelope) -> impl Future<Output = MindSyncResult<()>> + Send;
}
