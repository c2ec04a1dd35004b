//! Batch execution and orchestration for staged device rollouts.
//!
//! The engine drives an approved plan through its execution phase:
//! devices are partitioned into fixed-size batches, batches run strictly
//! in sequence with a pause between them, and devices within a batch run
//! concurrently. Every device follows the same sequence: snapshot, apply,
//! health check, rollback on failed health. Per-device failures are
//! isolated in the device's result; they never abort the batch and never
//! leave the plan stuck in `executing`.
//!
//! [`Orchestrator`] is the facade most callers want. It wires the plan
//! lifecycle manager, the applier registry, the device registry, and the
//! transport factory together behind `create_plan` / `approve_plan` /
//! `apply_plan` / `cancel_plan` / `rollback_plan`.

pub mod error;
pub mod executor;
pub mod job;
pub mod orchestrator;

pub use error::EngineError;
pub use executor::{BatchExecutor, CancelFlag, ExecutorConfig};
pub use job::{JobStore, SnapshotStore};
pub use orchestrator::{ApplyReport, Orchestrator, PlanRequest, RollbackReport};
