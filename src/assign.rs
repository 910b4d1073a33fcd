//! Device slot assignment
//!
//! Binds every desired interface to a device slot in `eth1..=ethN`, where N
//! is the number of desired interfaces. Explicit devices are honoured first;
//! the remaining interfaces fill the free slots in ascending order, sorted by
//! the name of the network they resolve to. Ties keep input order, so the
//! same input always produces the same layout.

use crate::models::{DesiredInterface, Slot};
use crate::network::{NetworkCatalog, NetworkRef};
use crate::{Error, Result};
use serde::Serialize;

/// A desired interface bound to a slot and a concrete network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedInterface {
    pub slot: Slot,
    pub network: NetworkRef,
    pub mac: Option<String>,
    /// Whether the caller pinned this slot
    pub explicit: bool,
}

/// Slot-indexed layout of the desired interfaces
///
/// Covers exactly `eth1..=ethN` with no gaps; slot 0 is never present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SlotMap {
    entries: Vec<AssignedInterface>,
}

impl SlotMap {
    pub fn get(&self, slot: Slot) -> Option<&AssignedInterface> {
        if slot.is_reserved() {
            return None;
        }
        self.entries.get(slot.index() as usize - 1)
    }

    /// Interfaces in ascending slot order
    pub fn iter(&self) -> impl Iterator<Item = &AssignedInterface> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assigns device slots to desired interfaces
pub struct SlotAssigner<'a> {
    catalog: &'a NetworkCatalog,
}

struct Resolved<'d> {
    desired: &'d DesiredInterface,
    network: NetworkRef,
}

impl<'a> SlotAssigner<'a> {
    pub fn new(catalog: &'a NetworkCatalog) -> Self {
        Self { catalog }
    }

    /// Assign `slot_count` slots to `desired`
    ///
    /// `slot_count` must equal `desired.len()`.
    pub fn assign(&self, desired: &[DesiredInterface], slot_count: usize) -> Result<SlotMap> {
        if slot_count != desired.len() {
            return Err(Error::Assignment(format!(
                "{} slots requested for {} interfaces",
                slot_count,
                desired.len()
            )));
        }
        let max = slot_count as u32;

        let mut pinned = Vec::new();
        let mut floating = Vec::new();
        for d in desired {
            let network = self.catalog.resolve(&d.network)?.clone();
            let resolved = Resolved { desired: d, network };
            match d.slot {
                Some(slot) => pinned.push((slot, resolved)),
                None => floating.push(resolved),
            }
        }

        pinned.sort_by_key(|(slot, _)| *slot);
        let mut table: Vec<Option<AssignedInterface>> = vec![None; slot_count];
        for (slot, r) in pinned {
            if slot.is_reserved() || slot.index() > max {
                return Err(Error::SlotOutOfRange { slot, max });
            }
            let cell = &mut table[slot.index() as usize - 1];
            if cell.is_some() {
                return Err(Error::SlotConflict { slot });
            }
            *cell = Some(AssignedInterface {
                slot,
                network: r.network,
                mac: r.desired.mac.clone(),
                explicit: true,
            });
        }

        // stable: equal names keep input order
        floating.sort_by(|a, b| a.network.name.cmp(&b.network.name));
        let mut floating = floating.into_iter();
        for (slot, cell) in Slot::user_range(slot_count).zip(table.iter_mut()) {
            if cell.is_some() {
                continue;
            }
            let Some(r) = floating.next() else { break };
            tracing::debug!(slot = %slot, network = %r.network.name, "Assigned free slot");
            *cell = Some(AssignedInterface {
                slot,
                network: r.network,
                mac: r.desired.mac.clone(),
                explicit: false,
            });
        }

        if floating.next().is_some() {
            return Err(Error::Assignment("interfaces left without a slot".into()));
        }
        let entries = table
            .into_iter()
            .zip(Slot::user_range(slot_count))
            .map(|(cell, slot)| {
                cell.ok_or_else(|| Error::Assignment(format!("{} left unassigned", slot)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SlotMap { entries })
    }
}
