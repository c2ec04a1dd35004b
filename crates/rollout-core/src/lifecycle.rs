//! Plan lifecycle manager.
//!
//! Owns plan identity and status. All status mutations go through the
//! state machine in [`crate::state_machine`] and happen under the plan's
//! store entry lock, so concurrent callers observe exactly one winner for
//! contended transitions (the at-most-once execution guarantee).

use crate::error::{PlanError, TokenError};
use crate::model::{
    ApprovalState, ChangeSet, DeviceId, Plan, PlanId, PlanStatus, RiskLevel,
};
use crate::state_machine::validate_transition;
use crate::token::TokenIssuer;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;

/// Input for plan creation. Device previews are produced by the calling
/// applier and arrive inside `changes`.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub tool_name: String,
    pub created_by: String,
    pub device_ids: Vec<DeviceId>,
    pub summary: String,
    pub changes: ChangeSet,
    pub risk_level: RiskLevel,
}

/// Terminal outcome reported by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed,
}

impl From<ExecutionOutcome> for PlanStatus {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Completed => PlanStatus::Completed,
            ExecutionOutcome::Failed => PlanStatus::Failed,
        }
    }
}

/// Owns Plan state and transitions.
///
/// The store is an in-memory concurrent map; every mutation acquires the
/// entry's shard lock, which is what makes `begin_execution` an atomic
/// compare-and-swap on `Plan.status`.
#[derive(Debug)]
pub struct PlanLifecycleManager {
    plans: DashMap<PlanId, Plan>,
    issuer: TokenIssuer,
}

impl PlanLifecycleManager {
    pub fn new(issuer: TokenIssuer) -> Self {
        Self {
            plans: DashMap::new(),
            issuer,
        }
    }

    /// Create a plan in `pending` with a freshly issued approval token.
    /// No side effects on devices.
    pub fn create_plan(&self, new: NewPlan) -> Result<Plan, PlanError> {
        let mut violations = Vec::new();
        if new.device_ids.is_empty() {
            violations.push("device_ids must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for device_id in &new.device_ids {
            if !seen.insert(device_id) {
                violations.push(format!("duplicate device id: {device_id}"));
            }
        }
        if new.tool_name.is_empty() {
            violations.push("tool_name must not be empty".to_string());
        }
        if new.created_by.is_empty() {
            violations.push("created_by must not be empty".to_string());
        }
        if !violations.is_empty() {
            return Err(PlanError::Validation { violations });
        }

        let id = PlanId::new();
        let issued = self.issuer.issue(id, &new.created_by);
        let now = Utc::now();

        let plan = Plan {
            id,
            tool_name: new.tool_name,
            created_by: new.created_by,
            approved_by: None,
            device_ids: new.device_ids,
            summary: new.summary,
            changes: new.changes,
            risk_level: new.risk_level,
            status: PlanStatus::Pending,
            approval: ApprovalState {
                token: issued.token,
                issued_at: issued.issued_at,
                expires_at: issued.expires_at,
            },
            created_at: now,
            approved_at: None,
            updated_at: now,
        };

        tracing::info!(
            plan_id = %plan.id,
            tool = %plan.tool_name,
            devices = plan.device_ids.len(),
            risk = %plan.risk_level,
            token = plan.approval.fingerprint(),
            "plan created"
        );

        self.plans.insert(id, plan.clone());
        Ok(plan)
    }

    /// Fetch a plan, optionally restricted to a caller-visible device scope.
    ///
    /// A non-empty `allowed_device_ids` hides plans that touch any device
    /// outside the scope; this supports per-caller visibility restriction
    /// without re-implementing policy logic here.
    pub fn get_plan(
        &self,
        plan_id: PlanId,
        allowed_device_ids: Option<&[DeviceId]>,
    ) -> Result<Plan, PlanError> {
        let plan = self
            .plans
            .get(&plan_id)
            .ok_or(PlanError::NotFound(plan_id))?;

        if let Some(scope) = allowed_device_ids {
            if !scope.is_empty() {
                let out_of_scope: Vec<DeviceId> = plan
                    .device_ids
                    .iter()
                    .filter(|d| !scope.contains(d))
                    .cloned()
                    .collect();
                if !out_of_scope.is_empty() {
                    return Err(PlanError::ScopeViolation {
                        plan_id,
                        out_of_scope,
                    });
                }
            }
        }

        Ok(plan.clone())
    }

    /// Approve a pending plan.
    ///
    /// The policy engine already checked tiers and scopes upstream, but
    /// self-approval is re-rejected here as a hard invariant regardless of
    /// what the caller claims.
    pub fn approve_plan(
        &self,
        plan_id: PlanId,
        approval_token: &str,
        approver: &str,
    ) -> Result<Plan, PlanError> {
        let mut plan = self
            .plans
            .get_mut(&plan_id)
            .ok_or(PlanError::NotFound(plan_id))?;

        if approver == plan.created_by {
            return Err(PlanError::SelfApproval {
                plan_id,
                actor: approver.to_string(),
            });
        }

        self.validate_token(&plan, approval_token)?;
        validate_transition(plan.status, PlanStatus::Approved)?;

        plan.status = PlanStatus::Approved;
        plan.approved_by = Some(approver.to_string());
        plan.approved_at = Some(Utc::now());
        plan.updated_at = Utc::now();

        tracing::info!(plan_id = %plan_id, approver, "plan approved");
        Ok(plan.clone())
    }

    /// Move a plan into `executing`, consuming the approval token.
    ///
    /// Atomic with respect to concurrent callers: the status check and the
    /// write happen under the entry lock, so of two simultaneous calls
    /// exactly one succeeds and the other fails with `AlreadyExecuting`.
    pub fn begin_execution(&self, plan_id: PlanId, approval_token: &str) -> Result<Plan, PlanError> {
        let mut plan = self
            .plans
            .get_mut(&plan_id)
            .ok_or(PlanError::NotFound(plan_id))?;

        if plan.status == PlanStatus::Executing {
            return Err(PlanError::AlreadyExecuting(plan_id));
        }
        validate_transition(plan.status, PlanStatus::Executing)?;
        self.validate_token(&plan, approval_token)?;

        plan.status = PlanStatus::Executing;
        plan.updated_at = Utc::now();

        tracing::info!(plan_id = %plan_id, "plan execution started");
        Ok(plan.clone())
    }

    /// Record the executor's terminal verdict. Only the executor calls this.
    pub fn finalize(&self, plan_id: PlanId, outcome: ExecutionOutcome) -> Result<Plan, PlanError> {
        let mut plan = self
            .plans
            .get_mut(&plan_id)
            .ok_or(PlanError::NotFound(plan_id))?;

        let to: PlanStatus = outcome.into();
        validate_transition(plan.status, to)?;

        plan.status = to;
        plan.updated_at = Utc::now();

        tracing::info!(plan_id = %plan_id, status = %to, "plan finalized");
        Ok(plan.clone())
    }

    /// Cancel a plan that has not started executing.
    pub fn cancel(&self, plan_id: PlanId, actor: &str) -> Result<Plan, PlanError> {
        let mut plan = self
            .plans
            .get_mut(&plan_id)
            .ok_or(PlanError::NotFound(plan_id))?;

        validate_transition(plan.status, PlanStatus::Cancelled)?;

        plan.status = PlanStatus::Cancelled;
        plan.updated_at = Utc::now();

        tracing::info!(plan_id = %plan_id, actor, "plan cancelled");
        Ok(plan.clone())
    }

    /// Number of plans in the store
    pub fn plan_count(&self) -> usize {
        self.plans.len()
    }

    /// All plans, for listing surfaces
    pub fn list_plans(&self) -> Vec<Plan> {
        self.plans.iter().map(|entry| entry.value().clone()).collect()
    }

    fn validate_token(&self, plan: &Plan, supplied: &str) -> Result<(), TokenError> {
        self.issuer.validate(
            plan.id,
            &plan.created_by,
            supplied,
            plan.approval.issued_at,
            plan.approval.expires_at,
            Utc::now(),
        )
    }
}
