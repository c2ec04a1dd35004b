//! Error types for plan lifecycle and approval tokens.
//!
//! Per-device failures during execution are NOT represented here: the
//! executor isolates those in each device's result. Only plan-level
//! precondition failures propagate to the caller.

use crate::model::{DeviceId, PlanId, PlanStatus};

/// Approval-token validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Token validity window has elapsed
    #[error("approval token expired")]
    Expired,

    /// Token does not match the (plan, creator) pair it was supplied for
    #[error("approval token mismatch")]
    Mismatch,
}

/// Plan lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// No plan exists for the given id
    #[error("plan {0} not found")]
    NotFound(PlanId),

    /// The plan touches devices outside the caller's visibility scope
    #[error("plan {plan_id} touches devices outside the caller's scope: {out_of_scope:?}")]
    ScopeViolation {
        plan_id: PlanId,
        out_of_scope: Vec<DeviceId>,
    },

    /// The requested transition is not in the plan state machine
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: PlanStatus, to: PlanStatus },

    /// A concurrent caller already moved the plan into execution
    #[error("plan {0} is already executing")]
    AlreadyExecuting(PlanId),

    /// Creator and approver must differ
    #[error("self-approval rejected for plan {plan_id}: {actor} created it")]
    SelfApproval { plan_id: PlanId, actor: String },

    /// Bad plan input; every violated constraint is listed
    #[error("invalid plan parameters: {violations:?}")]
    Validation { violations: Vec<String> },

    /// Token validation failure
    #[error(transparent)]
    Token(#[from] TokenError),
}
