//! Rollout Applier (rollout-applier)
//!
//! The pluggable per-domain capability layer of the rollout workflow.
//! A [`ChangeApplier`] provides validate / assess-risk / preview /
//! snapshot / apply / health-check / rollback for one configuration
//! domain (wireless, firewall, ...). The executor in `rollout-engine`
//! drives appliers without knowing their internals.
//!
//! Device access goes through the [`device::Transport`] trait; real
//! REST/SSH transports live outside this workspace, and the
//! [`mock`] module provides scriptable stand-ins for tests and the
//! simulator.

pub mod applier;
pub mod device;
pub mod error;
pub mod firewall;
pub mod mock;
pub mod registry;
pub mod snapshot;
pub mod wireless;

pub use applier::{
    baseline_risk, ApplyOutcome, BlastRadius, ChangeApplier, RollbackOutcome, ValidatedParams,
};
pub use device::{
    DeviceEnvironment, DeviceInfo, DeviceRegistry, Transport, TransportFactory, TransportHandle,
};
pub use error::{ApplierError, SnapshotError, TransportError};
pub use firewall::FirewallApplier;
pub use registry::ApplierRegistry;
pub use wireless::WirelessApplier;
