//! Plan status state machine.
//!
//! `pending → approved → executing → {completed, failed}` with
//! `pending|approved → cancelled` as the only side exits. Terminal states
//! admit no transitions. Every other transition fails and must leave the
//! plan unmutated (enforced by callers validating before writing).

use crate::error::PlanError;
use crate::model::PlanStatus;

/// Validates a plan status transition.
pub fn validate_transition(from: PlanStatus, to: PlanStatus) -> Result<(), PlanError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(PlanError::InvalidStateTransition { from, to })
    }
}

/// All statuses reachable from `from` in one step
pub fn allowed_transitions(from: PlanStatus) -> Vec<PlanStatus> {
    use PlanStatus::*;
    match from {
        // pending plans may skip explicit approval when the token holder
        // starts execution directly
        Pending => vec![Approved, Executing, Cancelled],
        Approved => vec![Executing, Cancelled],
        Executing => vec![Completed, Failed],
        Completed => vec![],
        Failed => vec![],
        Cancelled => vec![],
    }
}

fn allowed(from: PlanStatus, to: PlanStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
