//! Capped, append-only audit log and namespace naming.

use std::collections::VecDeque;

use mindsync_core::models::AuditEntry;

/// Namespace holding every conflict resolution outcome.
pub const RESOLUTION_NAMESPACE: &str = "conflict_resolutions";

/// Per-resource namespace for applied operations and remote merges.
pub fn resource_namespace(resource_id: &str) -> String {
    format!("resource:{resource_id}")
}

/// Keeps the most recent `capacity` entries, oldest first.
#[derive(Debug, Clone)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append, evicting the oldest entry once full.
    pub fn push(&mut self, entry: AuditEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
