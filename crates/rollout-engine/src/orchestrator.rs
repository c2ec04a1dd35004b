//! Facade wiring the lifecycle manager, applier registry, device
//! registry, transport factory, and executor into one API.
//!
//! Callers go through four phases: `create_plan` (validate, assess risk,
//! preview), `approve_plan` (second actor presents the approval token),
//! `apply_plan` (token re-presented, batched execution), and optionally
//! `rollback_plan` for a manual best-effort restore after the fact.

use crate::error::EngineError;
use crate::executor::{BatchExecutor, CancelFlag, ExecutorConfig};
use crate::job::{JobStore, SnapshotStore};
use dashmap::DashMap;
use rollout_applier::applier::{BlastRadius, RollbackOutcome};
use rollout_applier::device::{DeviceRegistry, TransportFactory};
use rollout_applier::registry::ApplierRegistry;
use rollout_core::lifecycle::{NewPlan, PlanLifecycleManager};
use rollout_core::model::{
    ChangeSet, DeviceApplyResult, DeviceApplyStatus, DeviceId, JobId, Plan, PlanId, PlanStatus,
    RiskLevel,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Input for plan creation
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// `<domain>.<action>`, e.g. `wireless.create`
    pub tool_name: String,
    pub created_by: String,
    pub device_ids: Vec<DeviceId>,
    pub summary: String,
    /// Domain-specific change payload, interpreted only by the applier
    pub params: Value,
}

/// Outcome of one `apply_plan` call
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub plan_id: PlanId,
    pub job_id: JobId,
    pub final_status: PlanStatus,
    /// The run was aborted at a batch boundary; unstarted devices stay
    /// `Pending` in `device_results`
    pub cancelled: bool,
    pub successful_devices: Vec<DeviceId>,
    pub failed_devices: Vec<DeviceId>,
    pub rolled_back_devices: Vec<DeviceId>,
    pub device_results: Vec<DeviceApplyResult>,
}

/// Outcome of a manual `rollback_plan` call
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub plan_id: PlanId,
    pub restored: Vec<DeviceId>,
    /// Some fields restored, some not; the detail says which
    pub partial: Vec<(DeviceId, String)>,
    pub failed: Vec<(DeviceId, String)>,
}

pub struct Orchestrator {
    lifecycle: Arc<PlanLifecycleManager>,
    appliers: ApplierRegistry,
    devices: Arc<dyn DeviceRegistry>,
    transports: Arc<dyn TransportFactory>,
    jobs: Arc<JobStore>,
    snapshots: Arc<SnapshotStore>,
    executor: BatchExecutor,
    active: DashMap<PlanId, CancelFlag>,
}

impl Orchestrator {
    pub fn new(
        lifecycle: Arc<PlanLifecycleManager>,
        appliers: ApplierRegistry,
        devices: Arc<dyn DeviceRegistry>,
        transports: Arc<dyn TransportFactory>,
        config: ExecutorConfig,
    ) -> Self {
        let snapshots = Arc::new(SnapshotStore::new());
        let executor = BatchExecutor::new(
            Arc::clone(&lifecycle),
            Arc::clone(&transports),
            Arc::clone(&snapshots),
            config,
        );
        Self {
            lifecycle,
            appliers,
            devices,
            transports,
            jobs: Arc::new(JobStore::new()),
            snapshots,
            executor,
            active: DashMap::new(),
        }
    }

    /// Validate parameters, assess risk across the target devices, and
    /// register a pending plan with per-device previews.
    ///
    /// The plan's risk level is the maximum over its devices; one
    /// production device makes the whole plan high-risk.
    pub async fn create_plan(&self, request: PlanRequest) -> Result<Plan, EngineError> {
        let (applier, operation) = self.appliers.resolve(&request.tool_name)?;
        let validated = applier.validate_params(operation, &request.params)?;

        let blast_base = BlastRadius {
            device_count: request.device_ids.len(),
            active_clients: 0,
        };

        let mut risk = RiskLevel::Low;
        let mut previews = Vec::with_capacity(request.device_ids.len());
        for device_id in &request.device_ids {
            let info = self.devices.get_device(device_id).await?;
            let blast = BlastRadius {
                active_clients: info.active_clients,
                ..blast_base
            };
            risk = risk.max(applier.assess_risk(operation, &info, &blast));
            previews.push(applier.generate_preview(device_id, &validated));
        }

        let plan = self.lifecycle.create_plan(NewPlan {
            tool_name: request.tool_name,
            created_by: request.created_by,
            device_ids: request.device_ids,
            summary: request.summary,
            changes: ChangeSet {
                params: request.params,
                previews,
            },
            risk_level: risk,
        })?;
        Ok(plan)
    }

    pub fn get_plan(
        &self,
        plan_id: PlanId,
        allowed_device_ids: Option<&[DeviceId]>,
    ) -> Result<Plan, EngineError> {
        Ok(self.lifecycle.get_plan(plan_id, allowed_device_ids)?)
    }

    pub fn approve_plan(
        &self,
        plan_id: PlanId,
        approval_token: &str,
        approver: &str,
    ) -> Result<Plan, EngineError> {
        Ok(self.lifecycle.approve_plan(plan_id, approval_token, approver)?)
    }

    /// Cancel a plan that has not started executing.
    pub fn cancel_plan(&self, plan_id: PlanId, actor: &str) -> Result<Plan, EngineError> {
        Ok(self.lifecycle.cancel(plan_id, actor)?)
    }

    /// Signal a running execution to stop at the next batch boundary.
    /// Devices already in flight run to completion.
    pub fn abort_execution(&self, plan_id: PlanId) -> bool {
        match self.active.get(&plan_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Execute an approved plan. The approval token is re-validated and
    /// consumed by the transition into `executing`; a second concurrent
    /// call loses the race and returns `AlreadyExecuting`.
    pub async fn apply_plan(
        &self,
        plan_id: PlanId,
        approval_token: &str,
    ) -> Result<ApplyReport, EngineError> {
        // Resolve and re-validate before touching plan state so a bad
        // tool name cannot strand the plan in executing.
        let plan = self.lifecycle.get_plan(plan_id, None)?;
        let (applier, operation) = self.appliers.resolve(&plan.tool_name)?;
        let validated = applier.validate_params(operation, &plan.changes.params)?;

        let plan = self.lifecycle.begin_execution(plan_id, approval_token)?;

        let cancel = CancelFlag::new();
        self.active.insert(plan_id, cancel.clone());
        let job = self.executor.run(&plan, applier, &validated, cancel).await;
        self.active.remove(&plan_id);

        self.jobs.record(job.clone());
        let final_status = self.lifecycle.get_plan(plan_id, None)?.status;

        let mut report = ApplyReport {
            plan_id,
            job_id: job.job_id,
            final_status,
            cancelled: job.cancelled,
            successful_devices: Vec::new(),
            failed_devices: Vec::new(),
            rolled_back_devices: Vec::new(),
            device_results: job.device_results,
        };
        for result in &report.device_results {
            match result.status {
                DeviceApplyStatus::Success => {
                    report.successful_devices.push(result.device_id.clone())
                }
                DeviceApplyStatus::Failed => report.failed_devices.push(result.device_id.clone()),
                DeviceApplyStatus::RolledBack => {
                    report.rolled_back_devices.push(result.device_id.clone())
                }
                DeviceApplyStatus::Pending => {}
            }
        }
        Ok(report)
    }

    /// Manually restore every device that has a stored snapshot from the
    /// plan's execution, best effort. Distinct from the automatic
    /// rollback the executor performs on failed health.
    pub async fn rollback_plan(&self, plan_id: PlanId) -> Result<RollbackReport, EngineError> {
        let plan = self.lifecycle.get_plan(plan_id, None)?;
        if plan.status == PlanStatus::Executing {
            return Err(EngineError::StillExecuting(plan_id));
        }
        self.jobs
            .latest_for_plan(plan_id)
            .ok_or(EngineError::JobNotFound(plan_id))?;

        let (applier, _) = self.appliers.resolve(&plan.tool_name)?;

        let mut report = RollbackReport {
            plan_id,
            restored: Vec::new(),
            partial: Vec::new(),
            failed: Vec::new(),
        };

        for snapshot in self.snapshots.for_plan(plan_id) {
            let device_id = snapshot.device_id.clone();
            let outcome = async {
                let transport = self
                    .transports
                    .acquire(&device_id)
                    .await
                    .map_err(|e| e.to_string())?;
                applier
                    .rollback(&*transport, &device_id, &snapshot)
                    .await
                    .map_err(|e| e.to_string())
            }
            .await;

            match outcome {
                Ok(RollbackOutcome::Success) => {
                    tracing::info!(plan_id = %plan_id, device_id = %device_id, "device restored");
                    report.restored.push(device_id);
                }
                Ok(RollbackOutcome::Partial { detail }) => {
                    tracing::warn!(plan_id = %plan_id, device_id = %device_id, detail = %detail, "device partially restored");
                    report.partial.push((device_id, detail));
                }
                Ok(RollbackOutcome::Failed { detail }) => {
                    tracing::warn!(plan_id = %plan_id, device_id = %device_id, detail = %detail, "restore failed");
                    report.failed.push((device_id, detail));
                }
                Err(e) => {
                    tracing::warn!(plan_id = %plan_id, device_id = %device_id, error = %e, "restore failed");
                    report.failed.push((device_id, e));
                }
            }
        }
        Ok(report)
    }

    pub fn latest_job(&self, plan_id: PlanId) -> Result<rollout_core::model::Job, EngineError> {
        self.jobs
            .latest_for_plan(plan_id)
            .ok_or(EngineError::JobNotFound(plan_id))
    }

    pub fn list_plans(&self) -> Vec<Plan> {
        self.lifecycle.list_plans()
    }
}
