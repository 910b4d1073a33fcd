//! Declarative VM network configuration

use crate::models::{DesiredInterface, Slot};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Network configuration for one VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmNetworkConfig {
    /// Hypervisor reference of the VM
    pub vm: String,
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
}

/// One entry of the VM's network list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEntry {
    PrivateNetwork(InterfaceSpec),
    PublicNetwork(InterfaceSpec),
    /// Port forwarding rule; carries no interface
    ForwardedPort(PortForward),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub guest: u16,
    pub host: u16,
}

/// Requested interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSpec {
    /// Hypervisor network name label
    pub network: String,
    /// `ethN`; assigned automatically when absent
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
}

impl InterfaceSpec {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Default::default()
        }
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn to_desired(&self) -> Result<DesiredInterface> {
        if self.network.trim().is_empty() {
            return Err(Error::Config("network name cannot be empty".into()));
        }

        let slot = match self.device.as_deref() {
            None => None,
            Some(device) => Some(Slot::from_device(device).ok_or_else(|| {
                Error::InvalidDevice {
                    network: self.network.clone(),
                    device: device.to_string(),
                }
            })?),
        };

        // an empty MAC means "let the host pick"
        let mac = match self.mac.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(mac) if is_valid_mac(mac) => Some(mac.to_ascii_lowercase()),
            Some(mac) => {
                return Err(Error::Config(format!(
                    "invalid MAC address '{}' for network '{}'",
                    mac, self.network
                )))
            }
        };

        Ok(DesiredInterface {
            network: self.network.clone(),
            slot,
            mac,
        })
    }
}

fn is_valid_mac(mac: &str) -> bool {
    let octets: Vec<_> = mac.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()))
}

impl VmNetworkConfig {
    pub fn new(vm: impl Into<String>) -> Self {
        Self {
            vm: vm.into(),
            networks: Vec::new(),
        }
    }

    pub fn private_network(mut self, spec: InterfaceSpec) -> Self {
        self.networks.push(NetworkEntry::PrivateNetwork(spec));
        self
    }

    pub fn public_network(mut self, spec: InterfaceSpec) -> Self {
        self.networks.push(NetworkEntry::PublicNetwork(spec));
        self
    }

    pub fn forwarded_port(mut self, guest: u16, host: u16) -> Self {
        self.networks
            .push(NetworkEntry::ForwardedPort(PortForward { guest, host }));
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vm.trim().is_empty() {
            return Err(Error::Config("vm cannot be empty".into()));
        }
        self.desired_interfaces().map(|_| ())
    }

    /// Interfaces to reconcile, in declaration order, forwarded ports dropped
    pub fn desired_interfaces(&self) -> Result<Vec<DesiredInterface>> {
        self.networks
            .iter()
            .filter_map(|entry| match entry {
                NetworkEntry::PrivateNetwork(spec) | NetworkEntry::PublicNetwork(spec) => {
                    Some(spec)
                }
                NetworkEntry::ForwardedPort(_) => None,
            })
            .map(InterfaceSpec::to_desired)
            .collect()
    }
}
