//! Hypervisor network catalog
//!
//! Indexes the networks a host reports, drops the host-internal management
//! network and classifies the rest as public (bridged to at least one physical
//! interface) or private (host-only).

use crate::models::NetworkId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// `other_config` key XenServer sets on the management network
pub const MANAGEMENT_NETWORK_KEY: &str = "is_host_internal_management_network";

/// Raw network record as reported by the hypervisor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub reference: String,
    pub name_label: String,
    #[serde(default)]
    pub pifs: Vec<String>,
    #[serde(default)]
    pub other_config: HashMap<String, String>,
}

impl NetworkRecord {
    pub fn new(reference: impl Into<String>, name_label: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            name_label: name_label.into(),
            ..Default::default()
        }
    }

    pub fn with_pif(mut self, pif: impl Into<String>) -> Self {
        self.pifs.push(pif.into());
        self
    }

    pub fn management(mut self) -> Self {
        self.other_config
            .insert(MANAGEMENT_NETWORK_KEY.to_string(), "true".to_string());
        self
    }

    pub fn is_management(&self) -> bool {
        self.other_config
            .get(MANAGEMENT_NETWORK_KEY)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Has at least one physical interface
    Public,
    /// Host-only
    Private,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Public => write!(f, "public"),
            NetworkKind::Private => write!(f, "private"),
        }
    }
}

/// A resolved network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub id: NetworkId,
    pub name: String,
    pub kind: NetworkKind,
}

impl fmt::Display for NetworkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Snapshot of the host's user-facing networks for one reconciliation pass
#[derive(Debug, Clone)]
pub struct NetworkCatalog {
    networks: Vec<NetworkRef>,
}

impl NetworkCatalog {
    /// Build the catalog from the hypervisor's raw network list
    pub fn build(records: &[NetworkRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Catalog("hypervisor reported no networks".into()));
        }

        let mut networks = Vec::with_capacity(records.len());
        for record in records {
            if record.reference.trim().is_empty() {
                return Err(Error::Catalog(format!(
                    "network '{}' has no reference",
                    record.name_label
                )));
            }
            if record.name_label.trim().is_empty() {
                return Err(Error::Catalog(format!(
                    "network {} has no name label",
                    record.reference
                )));
            }
            if record.is_management() {
                tracing::debug!(network = %record.reference, "Skipping management network");
                continue;
            }

            let kind = if record.pifs.is_empty() {
                NetworkKind::Private
            } else {
                NetworkKind::Public
            };
            networks.push(NetworkRef {
                id: NetworkId::new(&record.reference),
                name: record.name_label.clone(),
                kind,
            });
        }

        tracing::debug!(count = networks.len(), "Network catalog built");
        Ok(Self { networks })
    }

    /// Find a network by name label, ignoring case
    ///
    /// When several labels collide, the first one the host reported wins.
    pub fn resolve(&self, name: &str) -> Result<&NetworkRef> {
        let wanted = name.to_lowercase();
        self.networks
            .iter()
            .find(|n| n.name.to_lowercase() == wanted)
            .ok_or_else(|| Error::UnknownNetwork {
                requested: name.to_string(),
                available: self.describe(),
            })
    }

    /// Look up a network by hypervisor reference
    pub fn get(&self, id: &NetworkId) -> Option<&NetworkRef> {
        self.networks.iter().find(|n| &n.id == id)
    }

    /// Name of the network behind `id`, or the raw reference if it is not catalogued
    pub fn label(&self, id: &NetworkId) -> String {
        self.get(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// `Name (kind), Name (kind)` listing for operator diagnostics
    pub fn describe(&self) -> String {
        self.networks
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
