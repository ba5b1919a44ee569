//! Bounded memory of processed operation and envelope ids.

use std::collections::{HashSet, VecDeque};

/// Remembers the most recent `capacity` ids. Delivery is at-least-once, so a
/// remembered id means "already handled, do nothing".
#[derive(Debug, Clone)]
pub struct ProcessedOperations {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ProcessedOperations {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns false when it was already known.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_insert_reports_duplicate() {
        let mut seen = ProcessedOperations::new(4);
        assert!(seen.insert("op-1"));
        assert!(!seen.insert("op-1"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn oldest_ids_are_evicted() {
        let mut seen = ProcessedOperations::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");
        assert!(!seen.contains("a"));
        assert!(seen.contains("b") && seen.contains("c"));
    }
}
