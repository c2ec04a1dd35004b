//! Engine-level errors.
//!
//! Per-device failures during execution are never surfaced here; they are
//! recorded in the device's [`rollout_core::model::DeviceApplyResult`] and
//! the batch continues. `EngineError` covers plan-level preconditions
//! only.

use rollout_applier::error::ApplierError;
use rollout_core::error::PlanError;
use rollout_core::model::PlanId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Applier(#[from] ApplierError),

    /// Manual rollback was requested for a plan that never executed
    #[error("no execution job recorded for plan {0}")]
    JobNotFound(PlanId),

    /// Manual rollback was requested while the plan is still executing
    #[error("plan {0} is still executing")]
    StillExecuting(PlanId),
}
