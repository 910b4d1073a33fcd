//! In-memory simulated hypervisor
//!
//! Behaves like a single XenServer host for the calls the engine makes:
//! the next allowed device is the lowest free device number, creates on an
//! occupied device are rejected, and every call is journaled so tests can
//! assert on ordering.

use super::{GatewayError, GatewayResult, HypervisorGateway, VifRequest};
use crate::models::{AttachedInterface, InterfaceRef, NetworkId, Slot};
use crate::network::NetworkRecord;
use crate::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_max_devices() -> u32 {
    16
}

/// Host state the simulator starts from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub networks: Vec<NetworkRecord>,
    /// VIFs per VM reference
    #[serde(default)]
    pub vms: BTreeMap<String, Vec<AttachedInterface>>,
    #[serde(default = "default_max_devices")]
    pub max_devices: u32,
}

/// A journaled gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListNetworks,
    ListAttached { vm: String },
    NextAllowedSlot { vm: String },
    Create { vm: String, slot: Slot, network: NetworkId },
    Destroy { vif: InterfaceRef },
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListNetworks,
    ListAttached,
    NextAllowedSlot,
    Create,
    Destroy,
}

struct Fault {
    op: Operation,
    /// Calls of `op` to let through before failing
    skip: usize,
    message: String,
}

pub struct InMemoryHypervisor {
    state: RwLock<HostState>,
    journal: RwLock<Vec<GatewayCall>>,
    faults: RwLock<Vec<Fault>>,
}

impl Default for InMemoryHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHypervisor {
    pub fn new() -> Self {
        Self::from_state(HostState {
            max_devices: default_max_devices(),
            ..Default::default()
        })
    }

    pub fn from_state(state: HostState) -> Self {
        Self {
            state: RwLock::new(state),
            journal: RwLock::new(Vec::new()),
            faults: RwLock::new(Vec::new()),
        }
    }

    /// Load host state from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let state: HostState = serde_json::from_str(&raw)?;
        Ok(Self::from_state(state))
    }

    pub fn add_network(&self, record: NetworkRecord) -> NetworkId {
        let id = NetworkId::new(&record.reference);
        self.state.write().networks.push(record);
        id
    }

    /// Register a VM with no interfaces
    pub fn add_vm(&self, vm: impl Into<String>) {
        self.state.write().vms.entry(vm.into()).or_default();
    }

    /// Plug a VIF directly, bypassing the journal
    pub fn attach(&self, vm: &str, slot: Slot, network: &NetworkId) -> InterfaceRef {
        let reference = new_ref();
        self.state
            .write()
            .vms
            .entry(vm.to_string())
            .or_default()
            .push(AttachedInterface {
                slot,
                reference: reference.clone(),
                network: network.clone(),
            });
        reference
    }

    /// Current VIFs of `vm`, ascending by slot
    pub fn interfaces(&self, vm: &str) -> Vec<AttachedInterface> {
        let mut vifs = self.state.read().vms.get(vm).cloned().unwrap_or_default();
        vifs.sort_by_key(|v| v.slot);
        vifs
    }

    pub fn snapshot(&self) -> HostState {
        self.state.read().clone()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.journal.read().clone()
    }

    pub fn clear_calls(&self) {
        self.journal.write().clear();
    }

    /// Make the next call of `op` fail with `message`
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.fail_after(op, 0, message);
    }

    /// Let `skip` calls of `op` succeed, then fail the following one
    pub fn fail_after(&self, op: Operation, skip: usize, message: impl Into<String>) {
        self.faults.write().push(Fault {
            op,
            skip,
            message: message.into(),
        });
    }

    fn record(&self, call: GatewayCall) {
        self.journal.write().push(call);
    }

    fn check_fault(&self, op: Operation) -> GatewayResult<()> {
        let mut faults = self.faults.write();
        let Some(pos) = faults.iter().position(|f| f.op == op) else {
            return Ok(());
        };
        if faults[pos].skip > 0 {
            faults[pos].skip -= 1;
            return Ok(());
        }
        let fault = faults.remove(pos);
        Err(GatewayError::Command(fault.message))
    }
}

fn new_ref() -> InterfaceRef {
    InterfaceRef::new(format!("OpaqueRef:{}", uuid::Uuid::new_v4()))
}

impl HypervisorGateway for InMemoryHypervisor {
    fn list_networks(&self) -> GatewayResult<Vec<NetworkRecord>> {
        self.record(GatewayCall::ListNetworks);
        self.check_fault(Operation::ListNetworks)?;
        Ok(self.state.read().networks.clone())
    }

    fn list_attached_interfaces(&self, vm: &str) -> GatewayResult<Vec<AttachedInterface>> {
        self.record(GatewayCall::ListAttached { vm: vm.to_string() });
        self.check_fault(Operation::ListAttached)?;
        self.state
            .read()
            .vms
            .get(vm)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("VM {}", vm)))
    }

    fn next_allowed_slot(&self, vm: &str) -> GatewayResult<Slot> {
        self.record(GatewayCall::NextAllowedSlot { vm: vm.to_string() });
        self.check_fault(Operation::NextAllowedSlot)?;

        let state = self.state.read();
        let vifs = state
            .vms
            .get(vm)
            .ok_or_else(|| GatewayError::NotFound(format!("VM {}", vm)))?;
        (0..state.max_devices)
            .map(Slot::new)
            .find(|slot| vifs.iter().all(|v| v.slot != *slot))
            .ok_or_else(|| GatewayError::Rejected("no free VIF device".into()))
    }

    fn create_interface(&self, vm: &str, request: &VifRequest) -> GatewayResult<InterfaceRef> {
        self.record(GatewayCall::Create {
            vm: vm.to_string(),
            slot: request.slot,
            network: request.network.clone(),
        });
        self.check_fault(Operation::Create)?;

        let mut state = self.state.write();
        if !state
            .networks
            .iter()
            .any(|n| n.reference == request.network.as_str())
        {
            return Err(GatewayError::NotFound(format!("network {}", request.network)));
        }
        if request.slot.index() >= state.max_devices {
            return Err(GatewayError::Rejected(format!("{} exceeds device limit", request.slot)));
        }
        let vifs = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| GatewayError::NotFound(format!("VM {}", vm)))?;
        if vifs.iter().any(|v| v.slot == request.slot) {
            return Err(GatewayError::Rejected(format!(
                "DEVICE_ALREADY_EXISTS {}",
                request.slot.index()
            )));
        }

        let reference = new_ref();
        vifs.push(AttachedInterface {
            slot: request.slot,
            reference: reference.clone(),
            network: request.network.clone(),
        });
        Ok(reference)
    }

    fn destroy_interface(&self, interface: &InterfaceRef) -> GatewayResult<()> {
        self.record(GatewayCall::Destroy { vif: interface.clone() });
        self.check_fault(Operation::Destroy)?;

        let mut state = self.state.write();
        for vifs in state.vms.values_mut() {
            if let Some(pos) = vifs.iter().position(|v| &v.reference == interface) {
                vifs.remove(pos);
                return Ok(());
            }
        }
        Err(GatewayError::NotFound(format!("VIF {}", interface)))
    }
}
