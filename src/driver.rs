//! Applies a diff to the hypervisor
//!
//! Destroys run first, then creates in ascending slot order. Before each
//! create the host's next allowed device is checked against the slot being
//! filled; any disagreement aborts the pass. Nothing is retried and nothing
//! is rolled back: a failed pass leaves the VM partially converged and a
//! fresh pass re-diffs from whatever is attached.

use crate::diff::DiffResult;
use crate::gateway::{HypervisorGateway, VifRequest};
use crate::models::{InterfaceRef, Slot};
use crate::{Error, Result};
use serde::Serialize;

/// What a pass changed on the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub destroyed: Vec<(Slot, InterfaceRef)>,
    pub created: Vec<(Slot, InterfaceRef)>,
    pub unchanged: Vec<Slot>,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.destroyed.is_empty() && self.created.is_empty()
    }
}

/// Execute `diff` against `vm`
pub fn apply<G>(vm: &str, diff: &DiffResult, gateway: &G) -> Result<ApplyReport>
where
    G: HypervisorGateway + ?Sized,
{
    let mut report = ApplyReport {
        unchanged: diff.unchanged.clone(),
        ..Default::default()
    };

    for slot in &diff.unchanged {
        tracing::info!(vm = %vm, slot = %slot, "No change");
    }

    for current in &diff.to_destroy {
        tracing::info!(
            vm = %vm,
            slot = %current.slot,
            vif = %current.reference,
            network = %current.network,
            "Destroying VIF"
        );
        if let Err(e) = gateway.destroy_interface(&current.reference) {
            tracing::warn!(vm = %vm, slot = %current.slot, error = %e, "Destroy failed, aborting pass");
            return Err(Error::gateway(
                "destroy VIF",
                format!("{} ({})", current.slot, current.reference),
                Some(current.slot),
                e,
            ));
        }
        report.destroyed.push((current.slot, current.reference.clone()));
    }

    let mut creates: Vec<_> = diff.to_create.iter().collect();
    creates.sort_by_key(|c| c.slot);

    for want in creates {
        let offered = gateway
            .next_allowed_slot(vm)
            .map_err(|source| Error::Allocator {
                vm: vm.to_string(),
                slot: want.slot,
                source,
            })?;

        if offered != want.slot {
            tracing::warn!(
                vm = %vm,
                expected = %want.slot,
                offered = %offered,
                "Host offered an unexpected device, aborting pass"
            );
            return Err(Error::SlotMismatch {
                expected: want.slot,
                actual: offered,
            });
        }

        let request = VifRequest::new(want.slot, want.network.id.clone(), want.mac.clone());
        let vif = gateway.create_interface(vm, &request).map_err(|e| {
            tracing::warn!(vm = %vm, slot = %want.slot, error = %e, "Create failed, aborting pass");
            Error::gateway(
                "create VIF",
                format!("{} on {}", want.slot, want.network.name),
                Some(want.slot),
                e,
            )
        })?;

        tracing::info!(
            vm = %vm,
            slot = %want.slot,
            network = %want.network.name,
            vif = %vif,
            "Created VIF"
        );
        report.created.push((want.slot, vif));
    }

    Ok(report)
}
