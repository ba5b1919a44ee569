//! Vector clock management: increment, n-way merge, and conflict resolution
//! across concurrent clocks.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mindsync_core::models::{DeviceId, TherapeuticContext, VectorClock};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a set of clocks was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockResolutionStrategy {
    /// An active therapeutic session was involved; the merge is annotated so
    /// the payload layer applies therapeutic precedence.
    TherapeuticPrecedence,
    /// Plain pointwise-max merge.
    LamportMerge,
}

/// Result of reconciling several clocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorClockResolution {
    pub merged: VectorClock,
    pub strategy: ClockResolutionStrategy,
    /// At least one pair of inputs was concurrent.
    pub concurrent: bool,
}

/// Stateless vector clock operations.
pub struct VectorClockManager;

impl VectorClockManager {
    /// A copy of `clock` advanced by one local event on `device`.
    pub fn increment(clock: &VectorClock, device: &DeviceId) -> VectorClock {
        let mut next = clock.clone();
        next.increment(device.clone());
        next
    }

    /// Merge any number of clocks.
    ///
    /// Device counters take the pointwise max, the global counter becomes
    /// `max(global) + 1`, synchronized devices are unioned, and `last_updated`
    /// is the latest of the inputs so the result does not depend on when the
    /// merge ran. An empty input yields a fresh clock.
    pub fn merge(clocks: &[VectorClock]) -> VectorClock {
        if clocks.is_empty() {
            return VectorClock::new();
        }

        let mut device_clocks: BTreeMap<DeviceId, u64> = BTreeMap::new();
        let mut synchronized: BTreeSet<DeviceId> = BTreeSet::new();
        let mut max_global = 0u64;
        let mut last_updated = DateTime::<Utc>::UNIX_EPOCH;

        for clock in clocks {
            for (device, &count) in clock.device_clocks() {
                let entry = device_clocks.entry(device.clone()).or_insert(0);
                *entry = (*entry).max(count);
            }
            synchronized.extend(clock.synchronized_devices().iter().cloned());
            max_global = max_global.max(clock.global_clock());
            last_updated = last_updated.max(clock.last_updated());
        }

        VectorClock::from_parts(
            device_clocks,
            max_global.saturating_add(1),
            last_updated,
            synchronized,
        )
    }

    /// Whether any two clocks in the set are concurrent.
    pub fn any_concurrent(clocks: &[VectorClock]) -> bool {
        clocks.iter().enumerate().any(|(i, a)| {
            clocks[i + 1..]
                .iter()
                .any(|b| a.is_concurrent_with(b))
        })
    }

    /// Reconcile clocks that may be concurrent.
    ///
    /// The merged clock is always the n-way merge. When the inputs are
    /// concurrent and a therapeutic session is active, the resolution is
    /// tagged [`ClockResolutionStrategy::TherapeuticPrecedence`].
    pub fn resolve_vector_clock_conflicts(
        clocks: &[VectorClock],
        context: &TherapeuticContext,
    ) -> VectorClockResolution {
        let concurrent = Self::any_concurrent(clocks);
        let strategy = if concurrent && context.session_active {
            ClockResolutionStrategy::TherapeuticPrecedence
        } else {
            ClockResolutionStrategy::LamportMerge
        };
        let merged = Self::merge(clocks);

        debug!(
            inputs = clocks.len(),
            concurrent,
            strategy = ?strategy,
            global = merged.global_clock(),
            "resolved vector clocks"
        );

        VectorClockResolution {
            merged,
            strategy,
            concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_leaves_input_untouched() {
        let clock = VectorClock::new();
        let next = VectorClockManager::increment(&clock, &DeviceId::from("phone-1"));
        assert_eq!(clock.get("phone-1"), 0);
        assert_eq!(next.get("phone-1"), 1);
        assert_eq!(next.global_clock(), 1);
    }

    #[test]
    fn merge_bumps_global_past_every_input() {
        let a = VectorClock::from_counters([("phone-1", 3)], 3);
        let b = VectorClock::from_counters([("tablet-1", 2)], 5);
        let merged = VectorClockManager::merge(&[a.clone(), b.clone()]);
        assert_eq!(merged.get("phone-1"), 3);
        assert_eq!(merged.get("tablet-1"), 2);
        assert_eq!(merged.global_clock(), 6);
        assert!(merged.dominates(&a));
        assert!(merged.dominates(&b));
    }

    #[test]
    fn merge_of_nothing_is_fresh() {
        assert_eq!(VectorClockManager::merge(&[]), VectorClock::new());
    }

    #[test]
    fn concurrent_session_clocks_use_therapeutic_precedence() {
        let a = VectorClock::from_counters([("phone-1", 1)], 1);
        let b = VectorClock::from_counters([("tablet-1", 1)], 1);
        let context = TherapeuticContext {
            session_active: true,
            ..Default::default()
        };
        let resolution = VectorClockManager::resolve_vector_clock_conflicts(&[a, b], &context);
        assert!(resolution.concurrent);
        assert_eq!(
            resolution.strategy,
            ClockResolutionStrategy::TherapeuticPrecedence
        );
    }

    #[test]
    fn ordered_clocks_use_lamport_merge() {
        let a = VectorClock::from_counters([("phone-1", 1)], 1);
        let b = VectorClock::from_counters([("phone-1", 2)], 2);
        let context = TherapeuticContext {
            session_active: true,
            ..Default::default()
        };
        let resolution = VectorClockManager::resolve_vector_clock_conflicts(&[a, b], &context);
        assert!(!resolution.concurrent);
        assert_eq!(resolution.strategy, ClockResolutionStrategy::LamportMerge);
    }
}
