//! Error types for VIF reconciliation

use crate::gateway::GatewayError;
use crate::models::Slot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network catalog error: {0}")]
    Catalog(String),

    #[error("Unknown network '{requested}'. Available networks: {available}")]
    UnknownNetwork { requested: String, available: String },

    #[error("Device {slot} is requested by more than one interface")]
    SlotConflict { slot: Slot },

    #[error("Device {slot} is out of range (valid: eth1..eth{max})")]
    SlotOutOfRange { slot: Slot, max: u32 },

    #[error("Invalid device '{device}' for network '{network}' (expected ethN)")]
    InvalidDevice { network: String, device: String },

    #[error("Slot assignment invariant violated: {0}")]
    Assignment(String),

    #[error("Failed to query next allowed device for VM {vm} (creating {slot}): {source}")]
    Allocator {
        vm: String,
        slot: Slot,
        #[source]
        source: GatewayError,
    },

    #[error("Hypervisor offered device {actual} but {expected} was expected")]
    SlotMismatch { expected: Slot, actual: Slot },

    #[error("Failed to {operation} {target}: {source}")]
    Gateway {
        operation: &'static str,
        target: String,
        slot: Option<Slot>,
        #[source]
        source: GatewayError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn gateway(
        operation: &'static str,
        target: impl Into<String>,
        slot: Option<Slot>,
        source: GatewayError,
    ) -> Self {
        Error::Gateway {
            operation,
            target: target.into(),
            slot,
            source,
        }
    }

    /// The slot a failed pass stopped at, if the failure is tied to one
    pub fn failed_slot(&self) -> Option<Slot> {
        match self {
            Error::SlotConflict { slot } | Error::SlotOutOfRange { slot, .. } => Some(*slot),
            Error::SlotMismatch { expected, .. } => Some(*expected),
            Error::Allocator { slot, .. } => Some(*slot),
            Error::Gateway { slot, .. } => *slot,
            _ => None,
        }
    }

    /// Check if the error came from a remote call rather than from the input
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Allocator { .. } | Error::Gateway { .. })
    }
}
