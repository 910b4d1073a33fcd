//! Interface and network reference models

use super::Slot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque hypervisor reference to a VIF record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceRef(String);

impl InterfaceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque hypervisor reference to a network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(String);

impl NetworkId {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An interface the VM should have
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredInterface {
    /// Network name label, matched case-insensitively
    pub network: String,
    /// Explicit device, if the caller pinned one
    pub slot: Option<Slot>,
    /// Hardware address; the hypervisor generates one when absent
    pub mac: Option<String>,
}

impl DesiredInterface {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            slot: None,
            mac: None,
        }
    }

    pub fn at(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }
}

/// A VIF currently plugged into the VM, as reported by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedInterface {
    pub slot: Slot,
    pub reference: InterfaceRef,
    pub network: NetworkId,
}
