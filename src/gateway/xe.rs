//! XenServer gateway backed by the `xe` CLI

use super::{GatewayError, GatewayResult, HypervisorGateway, VifRequest};
use crate::models::{AttachedInterface, InterfaceRef, NetworkId, Slot};
use crate::network::NetworkRecord;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

/// Drives a XenServer host through `xe`
///
/// References are object UUIDs. Without a server the local host is used.
#[derive(Debug, Clone)]
pub struct XeGateway {
    binary: String,
    server: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password_file: Option<PathBuf>,
}

impl Default for XeGateway {
    fn default() -> Self {
        Self {
            binary: "xe".to_string(),
            server: None,
            port: None,
            username: None,
            password_file: None,
        }
    }
}

impl XeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, path: impl Into<String>) -> Self {
        self.binary = path.into();
        self
    }

    pub fn server(mut self, host: impl Into<String>) -> Self {
        self.server = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Log in as `username` with the password read by `xe` from `password_file`
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password_file: impl Into<PathBuf>,
    ) -> Self {
        self.username = Some(username.into());
        self.password_file = Some(password_file.into());
        self
    }

    fn args(&self, command: &str, params: &[(&str, &str)]) -> Vec<String> {
        let mut args = vec![command.to_string()];
        if let Some(server) = &self.server {
            args.extend(["-s".to_string(), server.clone()]);
        }
        if let Some(port) = self.port {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        if let Some(user) = &self.username {
            args.extend(["-u".to_string(), user.clone()]);
        }
        if let Some(path) = &self.password_file {
            args.extend(["-pwf".to_string(), path.display().to_string()]);
        }
        args.extend(params.iter().map(|(k, v)| format!("{}={}", k, v)));
        args
    }

    fn run(&self, command: &str, params: &[(&str, &str)]) -> GatewayResult<String> {
        tracing::trace!(command, "xe");
        let output = Command::new(&self.binary)
            .args(self.args(command, params))
            .output()?;

        if !output.status.success() {
            return Err(command_failure(command, &output));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn command_failure(command: &str, output: &std::process::Output) -> GatewayError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    GatewayError::Command(format!(
        "xe {} exited with {:?}\nStderr: {}\nStdout: {}",
        command,
        output.status.code(),
        stderr.trim(),
        stdout.trim()
    ))
}

impl HypervisorGateway for XeGateway {
    fn list_networks(&self) -> GatewayResult<Vec<NetworkRecord>> {
        let output = self.run(
            "network-list",
            &[("params", "uuid,name-label,PIF-uuids,other-config")],
        )?;
        parse_records(&output)
            .into_iter()
            .map(|mut r| -> GatewayResult<NetworkRecord> {
                Ok(NetworkRecord {
                    reference: take(&mut r, "uuid")?,
                    name_label: r.remove("name-label").unwrap_or_default(),
                    pifs: parse_set(r.get("PIF-uuids").map(String::as_str).unwrap_or("")),
                    other_config: parse_map(
                        r.get("other-config").map(String::as_str).unwrap_or(""),
                    ),
                })
            })
            .collect()
    }

    fn list_attached_interfaces(&self, vm: &str) -> GatewayResult<Vec<AttachedInterface>> {
        let output = self.run(
            "vif-list",
            &[("vm-uuid", vm), ("params", "uuid,device,network-uuid")],
        )?;
        parse_records(&output)
            .into_iter()
            .map(|mut r| -> GatewayResult<AttachedInterface> {
                let device = take(&mut r, "device")?;
                let slot = Slot::from_device_number(&device)
                    .ok_or_else(|| GatewayError::Parse(format!("bad device number '{}'", device)))?;
                Ok(AttachedInterface {
                    slot,
                    reference: InterfaceRef::new(take(&mut r, "uuid")?),
                    network: NetworkId::new(take(&mut r, "network-uuid")?),
                })
            })
            .collect()
    }

    fn next_allowed_slot(&self, vm: &str) -> GatewayResult<Slot> {
        let output = self.run(
            "vm-param-get",
            &[("uuid", vm), ("param-name", "allowed-VIF-devices")],
        )?;
        parse_allowed_devices(&output)
    }

    fn create_interface(&self, vm: &str, request: &VifRequest) -> GatewayResult<InterfaceRef> {
        let device = request.slot.index().to_string();
        let mtu = request.template.mtu.to_string();
        let mut params = vec![
            ("vm-uuid", vm),
            ("network-uuid", request.network.as_str()),
            ("device", device.as_str()),
            ("other-config:mtu", mtu.as_str()),
        ];
        if let Some(mac) = request.mac.as_deref() {
            params.push(("mac", mac));
        }

        let output = self.run("vif-create", &params)?;
        let uuid = output.trim();
        if uuid.is_empty() {
            return Err(GatewayError::Parse("vif-create returned no uuid".into()));
        }
        Ok(InterfaceRef::new(uuid))
    }

    fn destroy_interface(&self, interface: &InterfaceRef) -> GatewayResult<()> {
        self.run("vif-destroy", &[("uuid", interface.as_str())])?;
        Ok(())
    }
}

fn take(record: &mut HashMap<String, String>, key: &str) -> GatewayResult<String> {
    record
        .remove(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::Parse(format!("record is missing '{}'", key)))
}

/// Split `xe *-list` output into key/value records
///
/// Each line reads `key ( RO)   : value`; records are separated by blank lines.
fn parse_records(output: &str) -> Vec<HashMap<String, String>> {
    let mut records = Vec::new();
    let mut current = HashMap::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        let Some(close) = line.find(')') else { continue };
        let Some(colon) = line[close..].find(':') else { continue };
        let key = line[..close]
            .split(" (")
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let value = line[close + colon + 1..].trim().to_string();
        current.insert(key, value);
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// `a; b; c`
fn parse_set(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "<not in database>")
        .map(str::to_string)
        .collect()
}

/// `k1: v1; k2: v2`
fn parse_map(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .filter_map(|pair| {
            let (k, v) = pair.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn parse_allowed_devices(output: &str) -> GatewayResult<Slot> {
    let first = parse_set(output)
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::Rejected("no free VIF device".into()))?;
    Slot::from_device_number(&first)
        .ok_or_else(|| GatewayError::Parse(format!("bad device number '{}'", first)))
}
