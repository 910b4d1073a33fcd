//! Device slot model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric device position of a VIF on a VM (`eth0`, `eth1`, ...)
///
/// Slot 0 carries the host-internal management interface and is never
/// assigned, diffed or touched by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(u32);

impl Slot {
    /// Management interface slot
    pub const RESERVED: Slot = Slot(0);

    /// First slot available to user interfaces
    pub const FIRST: Slot = Slot(1);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }

    pub fn is_reserved(self) -> bool {
        self == Self::RESERVED
    }

    /// Parse a guest device name such as `eth3`
    pub fn from_device(device: &str) -> Option<Self> {
        let digits = device.strip_prefix("eth")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }

    /// Parse the decimal device number the hypervisor reports
    pub fn from_device_number(number: &str) -> Option<Self> {
        number.trim().parse().ok().map(Self)
    }

    /// Iterate `eth1..=ethN` for `count` user interfaces
    pub fn user_range(count: usize) -> impl Iterator<Item = Slot> {
        (1..=count as u32).map(Slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eth{}", self.0)
    }
}
