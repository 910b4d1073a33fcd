//! VIF Reconciler
//!
//! Converges the virtual network interfaces of a XenServer VM to a
//! declarative list: resolves network names against the host, assigns
//! device slots deterministically, diffs against what is attached and
//! applies the minimal destroy/create sequence.
//!
//! # Example
//!
//! ```no_run
//! use vif_reconcile::{DesiredInterface, Reconciler, XeGateway};
//!
//! let reconciler = Reconciler::new(XeGateway::new().server("xen01"));
//!
//! let desired = vec![
//!     DesiredInterface::new("Internal"),
//!     DesiredInterface::new("Pool-wide network associated with eth0"),
//! ];
//!
//! let report = reconciler.reconcile("2b6d7c1e-vm-uuid", &desired)?;
//! println!("created {} VIFs", report.created.len());
//! # Ok::<(), vif_reconcile::Error>(())
//! ```

pub mod assign;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod locks;
pub mod models;
pub mod network;
pub mod reconciler;

pub use assign::{AssignedInterface, SlotAssigner, SlotMap};
pub use config::{InterfaceSpec, VmNetworkConfig};
pub use diff::{DiffResult, SlotChange};
pub use driver::ApplyReport;
pub use error::{Error, Result};
pub use gateway::{GatewayError, HypervisorGateway, InMemoryHypervisor, XeGateway};
pub use locks::VmLocks;
pub use models::{AttachedInterface, DesiredInterface, InterfaceRef, NetworkId, Slot};
pub use network::{NetworkCatalog, NetworkKind, NetworkRecord, NetworkRef};
pub use reconciler::{Plan, Reconciler};
