//! Transport double that records every pushed envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use mindsync_core::errors::{MindSyncResult, TransportError};
use mindsync_core::models::SyncEnvelope;
use mindsync_core::traits::ITransport;

#[derive(Debug, Default)]
pub struct RecordingTransport {
    pushed: Mutex<Vec<SyncEnvelope>>,
    offline: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent pushes fail with `TransportError::Offline`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Vec<SyncEnvelope> {
        self.pushed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl ITransport for RecordingTransport {
    async fn push(&self, envelope: &SyncEnvelope) -> MindSyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Offline {
                message: "recording transport is offline".to_string(),
            }
            .into());
        }
        if let Ok(mut guard) = self.pushed.lock() {
            guard.push(envelope.clone());
        }
        Ok(())
    }
}
