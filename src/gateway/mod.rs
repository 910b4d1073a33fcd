//! Hypervisor access
//!
//! The reconciliation core only talks to the host through
//! [`HypervisorGateway`]. Every call is blocking and remote; implementations
//! own transport, sessions and any timeout policy.

pub mod memory;
pub mod xe;

pub use memory::InMemoryHypervisor;
pub use xe::XeGateway;

use crate::models::{AttachedInterface, InterfaceRef, NetworkId, Slot};
use crate::network::NetworkRecord;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by gateway implementations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("command failed: {0}")]
    Command(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("rejected by hypervisor: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Fixed device settings applied to every VIF the engine creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VifTemplate {
    pub mtu: u32,
    pub locking_mode: &'static str,
    pub qos_algorithm_type: &'static str,
}

impl Default for VifTemplate {
    fn default() -> Self {
        Self {
            mtu: 1500,
            locking_mode: "network_default",
            qos_algorithm_type: "",
        }
    }
}

/// Parameters for a single VIF create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VifRequest {
    pub slot: Slot,
    pub network: NetworkId,
    /// Empty lets the hypervisor generate an address
    pub mac: Option<String>,
    pub template: VifTemplate,
}

impl VifRequest {
    pub fn new(slot: Slot, network: NetworkId, mac: Option<String>) -> Self {
        Self {
            slot,
            network,
            mac,
            template: VifTemplate::default(),
        }
    }
}

/// Remote operations the reconciliation core consumes
#[cfg_attr(test, mockall::automock)]
pub trait HypervisorGateway {
    /// All networks known to the host, management network included
    fn list_networks(&self) -> GatewayResult<Vec<NetworkRecord>>;

    /// VIFs currently attached to `vm`
    fn list_attached_interfaces(&self, vm: &str) -> GatewayResult<Vec<AttachedInterface>>;

    /// The only device number the host will accept for the next create
    fn next_allowed_slot(&self, vm: &str) -> GatewayResult<Slot>;

    fn create_interface(&self, vm: &str, request: &VifRequest) -> GatewayResult<InterfaceRef>;

    fn destroy_interface(&self, interface: &InterfaceRef) -> GatewayResult<()>;
}

impl<G: HypervisorGateway + ?Sized> HypervisorGateway for &G {
    fn list_networks(&self) -> GatewayResult<Vec<NetworkRecord>> {
        (**self).list_networks()
    }

    fn list_attached_interfaces(&self, vm: &str) -> GatewayResult<Vec<AttachedInterface>> {
        (**self).list_attached_interfaces(vm)
    }

    fn next_allowed_slot(&self, vm: &str) -> GatewayResult<Slot> {
        (**self).next_allowed_slot(vm)
    }

    fn create_interface(&self, vm: &str, request: &VifRequest) -> GatewayResult<InterfaceRef> {
        (**self).create_interface(vm, request)
    }

    fn destroy_interface(&self, interface: &InterfaceRef) -> GatewayResult<()> {
        (**self).destroy_interface(interface)
    }
}

impl<G: HypervisorGateway + ?Sized> HypervisorGateway for std::sync::Arc<G> {
    fn list_networks(&self) -> GatewayResult<Vec<NetworkRecord>> {
        (**self).list_networks()
    }

    fn list_attached_interfaces(&self, vm: &str) -> GatewayResult<Vec<AttachedInterface>> {
        (**self).list_attached_interfaces(vm)
    }

    fn next_allowed_slot(&self, vm: &str) -> GatewayResult<Slot> {
        (**self).next_allowed_slot(vm)
    }

    fn create_interface(&self, vm: &str, request: &VifRequest) -> GatewayResult<InterfaceRef> {
        (**self).create_interface(vm, request)
    }

    fn destroy_interface(&self, interface: &InterfaceRef) -> GatewayResult<()> {
        (**self).destroy_interface(interface)
    }
}
