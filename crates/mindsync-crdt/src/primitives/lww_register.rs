//! Last-Writer-Wins Register (LWW-Register) CRDT.
//!
//! Each update carries a timestamp and device id. Merge keeps the value with
//! the highest timestamp. Tie-break: lexicographically greater device id wins.
//!
//! Used for: individual user preference keys and session position fields.
//!
//! # Examples
//!
//! ```
//! use mindsync_crdt::LWWRegister;
//! use chrono::{Duration, Utc};
//!
//! let now = Utc::now();
//! let mut a = LWWRegister::new("light".to_string(), now, "phone-1".into());
//! let b = LWWRegister::new("dark".to_string(), now + Duration::seconds(1), "tablet-1".into());
//!
//! a.merge(&b);
//! assert_eq!(a.get(), "dark");
//! ```

use chrono::{DateTime, Utc};
use mindsync_core::models::DeviceId;
use serde::{Deserialize, Serialize};

/// A last-writer-wins register. The value with the highest `(timestamp, device)`
/// pair wins on merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    value: T,
    timestamp: DateTime<Utc>,
    device: DeviceId,
}

impl<T: Clone> LWWRegister<T> {
    pub fn new(value: T, timestamp: DateTime<Utc>, device: DeviceId) -> Self {
        Self {
            value,
            timestamp,
            device,
        }
    }

    /// Update the value only if `(timestamp, device)` is greater than current.
    pub fn set(&mut self, value: T, timestamp: DateTime<Utc>, device: DeviceId) {
        if (timestamp, &device) > (self.timestamp, &self.device) {
            self.value = value;
            self.timestamp = timestamp;
            self.device = device;
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Keep the higher `(timestamp, device)` pair.
    ///
    /// When timestamps are equal, the lexicographically greater device id
    /// wins, so synchronized clocks still converge deterministically.
    pub fn merge(&mut self, other: &Self) {
        self.set(other.value.clone(), other.timestamp, other.device.clone());
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_timestamps_break_on_device() {
        let now = Utc::now();
        let mut a = LWWRegister::new(1, now, DeviceId::from("a"));
        let b = LWWRegister::new(2, now, DeviceId::from("b"));
        let mut b2 = b.clone();
        a.merge(&b);
        b2.merge(&LWWRegister::new(1, now, DeviceId::from("a")));
        assert_eq!(*a.get(), 2);
        assert_eq!(a, b2);
    }
}
