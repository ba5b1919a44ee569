//! Grow-only counter (G-Counter) CRDT.
//!
//! Each device maintains its own counter. The total value is the sum of all
//! device counters. Merge takes the per-device maximum.
//!
//! Used for: session practice time, which only ever accumulates.
//!
//! # Examples
//!
//! ```
//! use mindsync_crdt::GCounter;
//!
//! let mut a = GCounter::new();
//! a.add("phone-1", 120);
//!
//! let mut b = GCounter::new();
//! b.add("tablet-1", 60);
//!
//! a.merge(&b);
//! assert_eq!(a.value(), 180);
//! ```

use std::collections::BTreeMap;

use mindsync_core::models::DeviceId;
use serde::{Deserialize, Serialize};

/// A grow-only counter keyed by device. Merge = per-device max.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: BTreeMap<DeviceId, u64>,
}

impl GCounter {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Wrap existing per-device counts.
    pub fn from_counts(counts: BTreeMap<DeviceId, u64>) -> Self {
        Self { counts }
    }

    /// Add `amount` to the device's own counter.
    pub fn add(&mut self, device: &str, amount: u64) {
        let entry = self.counts.entry(DeviceId::from(device)).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Total across devices.
    pub fn value(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn device_value(&self, device: &str) -> u64 {
        self.counts.get(device).copied().unwrap_or(0)
    }

    /// Per-device max. `merge(A, B).value() >= max(A.value(), B.value())`.
    pub fn merge(&mut self, other: &Self) {
        for (device, &other_val) in &other.counts {
            let entry = self.counts.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(other_val);
        }
    }

    pub fn into_counts(self) -> BTreeMap<DeviceId, u64> {
        self.counts
    }
}

impl Default for GCounter {
    fn default() -> Self {
        Self::new()
    }
}
