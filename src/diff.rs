//! Diff between the desired slot layout and the VM's attached interfaces

use crate::assign::{AssignedInterface, SlotMap};
use crate::models::{AttachedInterface, NetworkId, Slot};
use crate::network::NetworkCatalog;
use serde::Serialize;
use std::collections::BTreeSet;

/// Work needed to converge one VM
///
/// Every desired slot is in exactly one of `to_create`/`unchanged`; every
/// attached non-reserved slot is in exactly one of `to_destroy`/`unchanged`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Attached interfaces to remove, ascending by slot
    pub to_destroy: Vec<AttachedInterface>,
    /// Interfaces to create, ascending by slot
    pub to_create: Vec<AssignedInterface>,
    /// Slots already converged
    pub unchanged: Vec<Slot>,
}

impl DiffResult {
    /// True when the VM already matches the desired layout
    pub fn is_converged(&self) -> bool {
        self.to_destroy.is_empty() && self.to_create.is_empty()
    }

    /// Per-slot view of the diff, ascending by slot
    pub fn changes(&self) -> Vec<SlotChange> {
        let mut slots = BTreeSet::new();
        slots.extend(self.unchanged.iter().copied());
        slots.extend(self.to_destroy.iter().map(|a| a.slot));
        slots.extend(self.to_create.iter().map(|c| c.slot));

        slots
            .into_iter()
            .map(|slot| {
                if self.unchanged.contains(&slot) {
                    let surplus: Vec<NetworkId> = self
                        .to_destroy
                        .iter()
                        .filter(|a| a.slot == slot)
                        .map(|a| a.network.clone())
                        .collect();
                    return if surplus.is_empty() {
                        SlotChange::Unchanged { slot }
                    } else {
                        SlotChange::Deduplicated { slot, surplus }
                    };
                }
                let destroyed = self.to_destroy.iter().find(|a| a.slot == slot);
                let created = self.to_create.iter().find(|c| c.slot == slot);
                match (destroyed, created) {
                    (Some(a), Some(c)) => SlotChange::Replaced {
                        slot,
                        from: a.network.clone(),
                        to: c.network.name.clone(),
                    },
                    (Some(a), None) => SlotChange::Removed {
                        slot,
                        network: a.network.clone(),
                    },
                    (None, Some(c)) => SlotChange::Added {
                        slot,
                        network: c.network.name.clone(),
                    },
                    (None, None) => SlotChange::Unchanged { slot },
                }
            })
            .collect()
    }
}

/// What happens to a single slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SlotChange {
    Unchanged { slot: Slot },
    /// Kept, with extra VIFs on the same device destroyed
    Deduplicated { slot: Slot, surplus: Vec<NetworkId> },
    Added { slot: Slot, network: String },
    Removed { slot: Slot, network: NetworkId },
    Replaced { slot: Slot, from: NetworkId, to: String },
}

impl SlotChange {
    /// Render with network names taken from `catalog`
    pub fn describe(&self, catalog: &NetworkCatalog) -> String {
        match self {
            SlotChange::Unchanged { slot } => format!("{}: unchanged", slot),
            SlotChange::Deduplicated { slot, surplus } => {
                let labels: Vec<_> = surplus.iter().map(|n| catalog.label(n)).collect();
                format!(
                    "{}: unchanged (surplus VIF on {} destroyed)",
                    slot,
                    labels.join(", ")
                )
            }
            SlotChange::Added { slot, network } => format!("{}: create on {}", slot, network),
            SlotChange::Removed { slot, network } => {
                format!("{}: destroy (was on {})", slot, catalog.label(network))
            }
            SlotChange::Replaced { slot, from, to } => {
                format!("{}: recreate, {} -> {}", slot, catalog.label(from), to)
            }
        }
    }
}

/// Classify attached interfaces against a slot map
pub fn diff(slot_map: &SlotMap, attached: &[AttachedInterface]) -> DiffResult {
    let mut result = DiffResult::default();
    let mut kept = BTreeSet::new();

    let mut attached: Vec<&AttachedInterface> =
        attached.iter().filter(|a| !a.slot.is_reserved()).collect();
    attached.sort_by_key(|a| a.slot);

    for current in attached {
        let matches = slot_map
            .get(current.slot)
            .is_some_and(|want| want.network.id == current.network);

        // a second record on an already-kept slot is surplus
        if matches && kept.insert(current.slot) {
            result.unchanged.push(current.slot);
        } else {
            result.to_destroy.push(current.clone());
        }
    }

    result.to_create = slot_map
        .iter()
        .filter(|want| !kept.contains(&want.slot))
        .cloned()
        .collect();

    result
}
