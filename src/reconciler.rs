//! Reconciliation entry point
//!
//! One pass is Catalog → Assign → Diff → Apply, strictly in sequence. Passes
//! for different VMs are independent; passes for the same VM must be
//! serialized by the caller (see [`crate::locks::VmLocks`]).

use crate::assign::{SlotAssigner, SlotMap};
use crate::diff::{self, DiffResult, SlotChange};
use crate::driver::{self, ApplyReport};
use crate::gateway::HypervisorGateway;
use crate::models::DesiredInterface;
use crate::network::NetworkCatalog;
use crate::{Error, Result};

/// Computed but not yet applied work for one VM
#[derive(Debug, Clone)]
pub struct Plan {
    pub vm: String,
    pub catalog: NetworkCatalog,
    pub slot_map: SlotMap,
    pub diff: DiffResult,
}

impl Plan {
    pub fn changes(&self) -> Vec<SlotChange> {
        self.diff.changes()
    }

    /// Human-readable per-slot lines
    pub fn describe(&self) -> Vec<String> {
        self.changes()
            .iter()
            .map(|c| c.describe(&self.catalog))
            .collect()
    }
}

/// Converges VM interfaces through a [`HypervisorGateway`]
pub struct Reconciler<G> {
    gateway: G,
}

impl<G: HypervisorGateway> Reconciler<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Compute the work needed for `vm` without touching it
    pub fn plan(&self, vm: &str, desired: &[DesiredInterface]) -> Result<Plan> {
        let records = self
            .gateway
            .list_networks()
            .map_err(|e| Error::gateway("list networks", "on host", None, e))?;
        let catalog = NetworkCatalog::build(&records)?;

        let slot_map = SlotAssigner::new(&catalog).assign(desired, desired.len())?;

        let attached = self
            .gateway
            .list_attached_interfaces(vm)
            .map_err(|e| Error::gateway("list VIFs", format!("of VM {}", vm), None, e))?;
        let diff = diff::diff(&slot_map, &attached);

        tracing::debug!(
            vm = %vm,
            unchanged = diff.unchanged.len(),
            destroy = diff.to_destroy.len(),
            create = diff.to_create.len(),
            "Planned VIF changes"
        );

        Ok(Plan {
            vm: vm.to_string(),
            catalog,
            slot_map,
            diff,
        })
    }

    /// Converge `vm` to `desired`, returning the first fatal error
    pub fn reconcile(&self, vm: &str, desired: &[DesiredInterface]) -> Result<ApplyReport> {
        tracing::info!(vm = %vm, interfaces = desired.len(), "Reconciling VIFs");

        let plan = self.plan(vm, desired)?;
        if plan.diff.is_converged() {
            tracing::info!(vm = %vm, "VIFs already converged");
        }

        let report = driver::apply(vm, &plan.diff, &self.gateway)?;
        tracing::info!(
            vm = %vm,
            destroyed = report.destroyed.len(),
            created = report.created.len(),
            "Reconcile complete"
        );
        Ok(report)
    }
}
