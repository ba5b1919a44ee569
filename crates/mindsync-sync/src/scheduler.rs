//! Cancellable deferred resolution tasks keyed by conflict id.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Debug)]
struct ScheduledTask {
    token: u64,
    handle: Option<AbortHandle>,
}

/// Registry of pending auto-resolutions.
///
/// A task fires only if it can still remove its own registry entry when the
/// delay elapses, so removing the entry (see [`Self::cancel`]) is enough to
/// stop it even if the abort races the wake-up.
#[derive(Debug, Clone, Default)]
pub struct ResolutionScheduler {
    tasks: Arc<DashMap<String, ScheduledTask>>,
    next_token: Arc<AtomicU64>,
}

impl ResolutionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay` unless cancelled first. Rescheduling an id
    /// replaces the earlier task. Must be called inside a Tokio runtime.
    pub fn schedule<F>(&self, conflict_id: &str, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(conflict_id);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(
            conflict_id.to_string(),
            ScheduledTask {
                token,
                handle: None,
            },
        );

        let tasks = Arc::clone(&self.tasks);
        let id = conflict_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tasks.remove_if(&id, |_, task| task.token == token).is_some() {
                debug!(conflict_id = %id, "grace window elapsed; resolving");
                job.await;
            }
        });

        if let Some(mut entry) = self.tasks.get_mut(conflict_id) {
            if entry.token == token {
                entry.handle = Some(handle.abort_handle());
            }
        }
        debug!(conflict_id, delay_ms = delay.as_millis() as u64, "auto-resolution scheduled");
    }

    /// Drop a pending task. Returns whether one was pending.
    pub fn cancel(&self, conflict_id: &str) -> bool {
        match self.tasks.remove(conflict_id) {
            Some((_, task)) => {
                if let Some(handle) = task.handle {
                    handle.abort();
                }
                debug!(conflict_id, "scheduled auto-resolution cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, conflict_id: &str) -> bool {
        self.tasks.contains_key(conflict_id)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}
