//! Rollout Core (rollout-core)
//!
//! Plan lifecycle for the plan → approve → apply workflow:
//! 1. **Plan**: a proposed multi-device change is frozen with previews and a risk level
//! 2. **Approve**: a time-bound, creator-bound token gates the transition
//! 3. **Apply**: the executor (rollout-engine) drives devices and reports the outcome
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rollout_core::prelude::*;
//!
//! let manager = PlanLifecycleManager::new(TokenIssuer::generate());
//! let plan = manager.create_plan(NewPlan { /* ... */ })?;
//!
//! let approved = manager.approve_plan(plan.id, &plan.approval.token, "reviewer")?;
//! let executing = manager.begin_execution(plan.id, &plan.approval.token)?;
//! ```

pub mod error;
pub mod lifecycle;
pub mod model;
pub mod state_machine;
pub mod token;

pub use error::{PlanError, TokenError};
pub use lifecycle::{ExecutionOutcome, NewPlan, PlanLifecycleManager};
pub use model::*;
pub use token::{IssuedToken, TokenConfig, TokenIssuer};

/// Re-export of the most commonly used types
pub mod prelude {
    pub use crate::error::{PlanError, TokenError};
    pub use crate::lifecycle::{ExecutionOutcome, NewPlan, PlanLifecycleManager};
    pub use crate::model::{
        ChangeSet, DeviceApplyResult, DeviceApplyStatus, DeviceId, DeviceSnapshot, HealthReport,
        HealthState, Job, JobId, Operation, Plan, PlanId, PlanStatus, Preview, RiskLevel,
        SnapshotId,
    };
    pub use crate::state_machine::{allowed_transitions, validate_transition};
    pub use crate::token::{IssuedToken, TokenConfig, TokenIssuer};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
