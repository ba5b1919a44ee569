//! Per-device logical time.
//!
//! # Examples
//!
//! ```
//! use mindsync_core::models::VectorClock;
//!
//! let mut phone = VectorClock::new();
//! phone.increment("phone-1");
//!
//! let mut tablet = phone.clone();
//! tablet.increment("tablet-1");
//!
//! assert!(phone.happened_before(&tablet));
//! assert!(!tablet.happened_before(&phone));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::device::DeviceId;

/// Vector clock: one monotonically increasing counter per device, plus a
/// global counter bumped on every local event and merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorClock {
    device_clocks: BTreeMap<DeviceId, u64>,
    global_clock: u64,
    last_updated: DateTime<Utc>,
    synchronized_devices: BTreeSet<DeviceId>,
}

impl VectorClock {
    /// An empty clock.
    pub fn new() -> Self {
        Self {
            device_clocks: BTreeMap::new(),
            global_clock: 0,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            synchronized_devices: BTreeSet::new(),
        }
    }

    /// Build a clock from explicit counters. Mostly useful for fixtures and
    /// decoding foreign snapshots.
    pub fn from_counters<I, D>(counters: I, global_clock: u64) -> Self
    where
        I: IntoIterator<Item = (D, u64)>,
        D: Into<DeviceId>,
    {
        let device_clocks: BTreeMap<DeviceId, u64> =
            counters.into_iter().map(|(d, c)| (d.into(), c)).collect();
        let synchronized_devices = device_clocks.keys().cloned().collect();
        Self {
            device_clocks,
            global_clock,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
            synchronized_devices,
        }
    }

    /// Assemble a clock from already-computed parts.
    pub fn from_parts(
        device_clocks: BTreeMap<DeviceId, u64>,
        global_clock: u64,
        last_updated: DateTime<Utc>,
        synchronized_devices: BTreeSet<DeviceId>,
    ) -> Self {
        Self {
            device_clocks,
            global_clock,
            last_updated,
            synchronized_devices,
        }
    }

    /// Record a local event on `device`.
    pub fn increment(&mut self, device: impl Into<DeviceId>) {
        let device = device.into();
        *self.device_clocks.entry(device.clone()).or_insert(0) += 1;
        self.synchronized_devices.insert(device);
        self.global_clock += 1;
        self.last_updated = Utc::now();
    }

    /// Counter for `device`, 0 when unknown.
    pub fn get(&self, device: &str) -> u64 {
        self.device_clocks.get(device).copied().unwrap_or(0)
    }

    /// All devices with a counter.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.device_clocks.keys()
    }

    pub fn device_clocks(&self) -> &BTreeMap<DeviceId, u64> {
        &self.device_clocks
    }

    pub fn global_clock(&self) -> u64 {
        self.global_clock
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn synchronized_devices(&self) -> &BTreeSet<DeviceId> {
        &self.synchronized_devices
    }

    /// Fold another clock in: pointwise max, max global, union of devices.
    /// Unlike a merge through the clock manager, the global counter is not bumped.
    pub fn observe(&mut self, other: &Self) {
        for (device, &count) in &other.device_clocks {
            let entry = self.device_clocks.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        self.synchronized_devices
            .extend(other.synchronized_devices.iter().cloned());
        self.global_clock = self.global_clock.max(other.global_clock);
        self.last_updated = self.last_updated.max(other.last_updated);
    }

    /// Every counter of `self` is >= the matching counter of `other`.
    pub fn dominates(&self, other: &Self) -> bool {
        other
            .device_clocks
            .iter()
            .all(|(device, &count)| self.get(device.as_str()) >= count)
    }

    /// `self` causally precedes `other`: dominated and not equal.
    pub fn happened_before(&self, other: &Self) -> bool {
        other.dominates(self) && !self.dominates(other)
    }

    /// Neither clock dominates the other.
    pub fn is_concurrent_with(&self, other: &Self) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Same per-device counters (ignores global counter and timestamps).
    pub fn same_causal_history(&self, other: &Self) -> bool {
        self.dominates(other) && other.dominates(self)
    }
}

impl Default for VectorClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.device_clocks == other.device_clocks
            && self.global_clock == other.global_clock
            && self.synchronized_devices == other.synchronized_devices
    }
}

impl Eq for VectorClock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_bumps_device_and_global() {
        let mut clock = VectorClock::new();
        clock.increment("phone-1");
        clock.increment("phone-1");
        clock.increment("tablet-1");
        assert_eq!(clock.get("phone-1"), 2);
        assert_eq!(clock.get("tablet-1"), 1);
        assert_eq!(clock.get("web"), 0);
        assert_eq!(clock.global_clock(), 3);
    }

    #[test]
    fn concurrent_clocks_detected() {
        let a = VectorClock::from_counters([("phone-1", 2), ("tablet-1", 1)], 3);
        let b = VectorClock::from_counters([("phone-1", 1), ("tablet-1", 2)], 3);
        assert!(a.is_concurrent_with(&b));
        assert!(!a.happened_before(&b));
    }

    #[test]
    fn observe_never_shrinks() {
        let mut a = VectorClock::from_counters([("phone-1", 5)], 5);
        let b = VectorClock::from_counters([("phone-1", 2), ("tablet-1", 4)], 9);
        a.observe(&b);
        assert_eq!(a.get("phone-1"), 5);
        assert_eq!(a.get("tablet-1"), 4);
        assert_eq!(a.global_clock(), 9);
    }
}
