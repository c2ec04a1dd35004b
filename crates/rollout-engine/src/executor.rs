//! Batched execution of an approved plan.
//!
//! Devices are partitioned into `ceil(N / batch_size)` batches in plan
//! order. Batches run strictly in sequence; devices within a batch run
//! concurrently, bounded by a semaphore of `batch_size`. Between batches
//! the executor sleeps for `batch_pause` (skipped after the last batch)
//! and checks the cancellation flag at the start of each batch.
//!
//! Per device the sequence is snapshot, apply, health check, and rollback
//! when health fails. Failures are isolated: one device failing marks its
//! own result and the rest of the batch continues. The executor always
//! finalizes the plan to `completed` or `failed` before returning.

use crate::job::SnapshotStore;
use rollout_applier::applier::{ApplyOutcome, ChangeApplier, RollbackOutcome, ValidatedParams};
use rollout_applier::device::{Transport, TransportFactory};
use rollout_core::lifecycle::{ExecutionOutcome, PlanLifecycleManager};
use rollout_core::model::{
    DeviceApplyResult, DeviceApplyStatus, DeviceId, HealthReport, HealthState, Job, JobId, Plan,
    PlanId,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Execution tuning knobs
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Devices per batch
    pub batch_size: usize,
    /// Sleep between consecutive batches
    pub batch_pause: Duration,
    /// Hard ceiling on one device's health check
    pub health_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause: Duration::from_secs(2),
            health_timeout: Duration::from_secs(10),
        }
    }
}

/// Cooperative cancellation signal, observed at batch boundaries only.
/// Devices already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs one execution attempt of a plan and finalizes it.
pub struct BatchExecutor {
    lifecycle: Arc<PlanLifecycleManager>,
    transports: Arc<dyn TransportFactory>,
    snapshots: Arc<SnapshotStore>,
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(
        lifecycle: Arc<PlanLifecycleManager>,
        transports: Arc<dyn TransportFactory>,
        snapshots: Arc<SnapshotStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            lifecycle,
            transports,
            snapshots,
            config,
        }
    }

    /// Execute a plan that is already in `executing`.
    ///
    /// Returns the job record. The plan is finalized on every path:
    /// all devices succeeded means `completed`, anything else, including
    /// cancellation, means `failed`.
    pub async fn run(
        &self,
        plan: &Plan,
        applier: Arc<dyn ChangeApplier>,
        params: &ValidatedParams,
        cancel: CancelFlag,
    ) -> Job {
        let batch_size = self.config.batch_size.max(1);
        let batches = partition(&plan.device_ids, batch_size);

        let mut job = Job {
            job_id: JobId::new(),
            plan_id: plan.id,
            device_ids: plan.device_ids.clone(),
            batches_total: batches.len(),
            batches_completed: 0,
            device_results: plan
                .device_ids
                .iter()
                .cloned()
                .map(DeviceApplyResult::pending)
                .collect(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        };

        tracing::info!(
            plan_id = %plan.id,
            job_id = %job.job_id,
            devices = plan.device_ids.len(),
            batches = job.batches_total,
            "execution started"
        );

        let semaphore = Arc::new(Semaphore::new(batch_size));

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                job.cancelled = true;
                tracing::warn!(
                    plan_id = %plan.id,
                    batches_completed = job.batches_completed,
                    "execution cancelled before batch start"
                );
                break;
            }

            tracing::debug!(
                plan_id = %plan.id,
                batch = index + 1,
                of = job.batches_total,
                devices = batch.len(),
                "batch started"
            );

            let handles: Vec<_> = batch
                .iter()
                .map(|device_id| {
                    let task = DeviceTask {
                        applier: Arc::clone(&applier),
                        transports: Arc::clone(&self.transports),
                        snapshots: Arc::clone(&self.snapshots),
                        semaphore: Arc::clone(&semaphore),
                        plan_id: plan.id,
                        device_id: device_id.clone(),
                        params: params.clone(),
                        health_timeout: self.config.health_timeout,
                    };
                    (device_id.clone(), tokio::spawn(task.run()))
                })
                .collect();

            let joined = futures::future::join_all(
                handles
                    .into_iter()
                    .map(|(device_id, handle)| async move { (device_id, handle.await) }),
            )
            .await;

            for (device_id, outcome) in joined {
                let result = match outcome {
                    Ok(result) => result,
                    Err(join_err) => {
                        tracing::error!(
                            plan_id = %plan.id,
                            device_id = %device_id,
                            error = %join_err,
                            "device task aborted"
                        );
                        DeviceApplyResult {
                            status: DeviceApplyStatus::Failed,
                            error: Some(format!("device task aborted: {join_err}")),
                            ..DeviceApplyResult::pending(device_id.clone())
                        }
                    }
                };
                record_result(&mut job, result);
            }

            job.batches_completed = index + 1;

            if index + 1 < job.batches_total {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        let all_succeeded = !job.cancelled
            && job
                .device_results
                .iter()
                .all(|r| r.status == DeviceApplyStatus::Success);
        let outcome = if all_succeeded {
            ExecutionOutcome::Completed
        } else {
            ExecutionOutcome::Failed
        };

        job.finished_at = Some(Utc::now());

        if let Err(e) = self.lifecycle.finalize(plan.id, outcome) {
            tracing::error!(plan_id = %plan.id, error = %e, "finalize failed");
        }

        tracing::info!(
            plan_id = %plan.id,
            job_id = %job.job_id,
            outcome = ?outcome,
            batches_completed = job.batches_completed,
            "execution finished"
        );

        job
    }
}

/// Partition devices into `ceil(N / batch_size)` batches, preserving
/// plan order. `batch_size` must be at least 1.
pub fn partition(device_ids: &[DeviceId], batch_size: usize) -> Vec<Vec<DeviceId>> {
    device_ids
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn record_result(job: &mut Job, result: DeviceApplyResult) {
    if let Some(slot) = job
        .device_results
        .iter_mut()
        .find(|r| r.device_id == result.device_id)
    {
        *slot = result;
    }
}

/// Everything one device's rollout needs, owned so it can be spawned.
struct DeviceTask {
    applier: Arc<dyn ChangeApplier>,
    transports: Arc<dyn TransportFactory>,
    snapshots: Arc<SnapshotStore>,
    semaphore: Arc<Semaphore>,
    plan_id: PlanId,
    device_id: DeviceId,
    params: ValidatedParams,
    health_timeout: Duration,
}

impl DeviceTask {
    async fn run(self) -> DeviceApplyResult {
        let _permit = self.semaphore.clone().acquire_owned().await.ok();
        let mut result = DeviceApplyResult::pending(self.device_id.clone());

        // Transport is released on every exit path when the handle drops.
        let transport = match self.transports.acquire(&self.device_id).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(device_id = %self.device_id, error = %e, "transport unavailable");
                result.status = DeviceApplyStatus::Failed;
                result.error = Some(format!("transport unavailable: {e}"));
                return result;
            }
        };

        // Snapshot failure blocks the change entirely; without a restore
        // point the apply must not run.
        let snapshot = match self
            .applier
            .create_snapshot(&*transport, &self.device_id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(device_id = %self.device_id, error = %e, "snapshot failed");
                result.status = DeviceApplyStatus::Failed;
                result.error = Some(format!("snapshot failed: {e}"));
                return result;
            }
        };
        result.snapshot_id = Some(snapshot.snapshot_id);
        self.snapshots.insert(self.plan_id, snapshot.clone());

        match self
            .applier
            .apply(&*transport, &self.device_id, &self.params)
            .await
        {
            Ok(ApplyOutcome::Success) => {}
            Ok(ApplyOutcome::Failed { detail }) => {
                // Clean refusal: the device reported the change did not
                // take, so there is nothing to roll back.
                tracing::warn!(device_id = %self.device_id, detail = %detail, "apply refused");
                result.status = DeviceApplyStatus::Failed;
                result.error = Some(detail);
                return result;
            }
            Err(e) => {
                // The change may have partially landed; restore the
                // snapshot before giving up on this device.
                tracing::warn!(device_id = %self.device_id, error = %e, "apply errored");
                result.error = Some(format!("apply errored: {e}"));
                result.status = match self
                    .applier
                    .rollback(&*transport, &self.device_id, &snapshot)
                    .await
                {
                    Ok(RollbackOutcome::Success) | Ok(RollbackOutcome::Partial { .. }) => {
                        DeviceApplyStatus::RolledBack
                    }
                    Ok(RollbackOutcome::Failed { detail }) => {
                        result.detail = Some(detail);
                        DeviceApplyStatus::Failed
                    }
                    Err(rb_err) => {
                        result.detail = Some(format!("rollback errored: {rb_err}"));
                        DeviceApplyStatus::Failed
                    }
                };
                return result;
            }
        }

        let health = self.checked_health(&*transport).await;
        result.health = Some(health.clone());

        match health.state {
            HealthState::Healthy | HealthState::Degraded => {
                result.status = DeviceApplyStatus::Success;
                result
            }
            HealthState::Failed => {
                tracing::warn!(device_id = %self.device_id, "post-apply health failed, rolling back");
                result.status = DeviceApplyStatus::RolledBack;
                result.error = Some("post-apply health check failed".to_string());
                match self
                    .applier
                    .rollback(&*transport, &self.device_id, &snapshot)
                    .await
                {
                    Ok(RollbackOutcome::Success) => {}
                    Ok(RollbackOutcome::Partial { detail })
                    | Ok(RollbackOutcome::Failed { detail }) => {
                        result.detail = Some(detail);
                    }
                    Err(e) => {
                        result.detail = Some(format!("rollback errored: {e}"));
                    }
                }
                result
            }
        }
    }

    /// Health check with a hard outer deadline. An applier that never
    /// answers is indistinguishable from a dead device.
    ///
    /// Takes the bare transport rather than the handle: the handle is
    /// not `Sync`, and borrowing it across an await would make the
    /// spawned device future non-`Send`.
    async fn checked_health(&self, transport: &dyn Transport) -> HealthReport {
        let check = self
            .applier
            .health_check(transport, &self.device_id, self.health_timeout);
        match tokio::time::timeout(self.health_timeout, check).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => HealthReport::failed(format!("health check errored: {e}")),
            Err(_) => HealthReport::failed(format!(
                "health check exceeded {:?}",
                self.health_timeout
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_applier::applier::ValidatedParams;
    use rollout_applier::mock::{MockApplier, MockTransportFactory};
    use rollout_core::model::Operation;
    use serde_json::json;

    // The per-device future crosses a tokio::spawn boundary, so it must
    // stay Send even though the transport handle itself is not Sync.
    #[tokio::test]
    async fn device_task_future_is_spawnable() {
        let task = DeviceTask {
            applier: Arc::new(MockApplier::new()),
            transports: Arc::new(MockTransportFactory::new()),
            snapshots: Arc::new(SnapshotStore::new()),
            semaphore: Arc::new(Semaphore::new(1)),
            plan_id: PlanId::new(),
            device_id: DeviceId::from("ap-1"),
            params: ValidatedParams {
                operation: Operation::Create,
                fields: json!({}),
            },
            health_timeout: Duration::from_millis(200),
        };

        let result = tokio::spawn(task.run()).await.unwrap();
        assert_eq!(result.status, DeviceApplyStatus::Success);
    }

    #[test]
    fn default_config_matches_rollout_policy() {
        let config = ExecutorConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.batch_pause, Duration::from_secs(2));
        assert_eq!(config.health_timeout, Duration::from_secs(10));
    }

    #[test]
    fn cancel_flag_is_sticky_and_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
