//! In-memory bookkeeping for execution attempts.
//!
//! A [`Job`] is the record of one execution attempt of a plan; the
//! [`SnapshotStore`] keeps the per-device snapshots captured during that
//! attempt so a later manual rollback can restore them.

use dashmap::DashMap;
use rollout_core::model::{DeviceId, DeviceSnapshot, Job, JobId, PlanId};

/// Concurrent store of execution records, newest job per plan indexed.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
    by_plan: DashMap<PlanId, JobId>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, job: Job) {
        self.by_plan.insert(job.plan_id, job.job_id);
        self.jobs.insert(job.job_id, job);
    }

    pub fn get(&self, job_id: JobId) -> Option<Job> {
        self.jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    /// Most recent execution attempt for a plan
    pub fn latest_for_plan(&self, plan_id: PlanId) -> Option<Job> {
        let job_id = *self.by_plan.get(&plan_id)?.value();
        self.get(job_id)
    }
}

/// Snapshots captured during execution, grouped by plan.
///
/// A device appears at most once per plan since a device is visited at
/// most once per execution attempt.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    by_plan: DashMap<PlanId, Vec<DeviceSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan_id: PlanId, snapshot: DeviceSnapshot) {
        self.by_plan.entry(plan_id).or_default().push(snapshot);
    }

    /// All snapshots captured for a plan, in device visit order
    pub fn for_plan(&self, plan_id: PlanId) -> Vec<DeviceSnapshot> {
        self.by_plan
            .get(&plan_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn for_device(&self, plan_id: PlanId, device_id: &DeviceId) -> Option<DeviceSnapshot> {
        self.by_plan
            .get(&plan_id)?
            .iter()
            .find(|s| &s.device_id == device_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rollout_core::model::SnapshotId;

    fn snapshot(device: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            snapshot_id: SnapshotId::new(),
            device_id: DeviceId::from(device),
            taken_at: Utc::now(),
            payload: vec![1, 2, 3],
            checksum: "abc".to_string(),
        }
    }

    #[test]
    fn latest_job_wins_the_plan_index() {
        let store = JobStore::new();
        let plan_id = PlanId::new();

        let first = Job {
            job_id: JobId::new(),
            plan_id,
            device_ids: Vec::new(),
            batches_total: 0,
            batches_completed: 0,
            device_results: Vec::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        };
        let second = Job {
            job_id: JobId::new(),
            ..first.clone()
        };

        store.record(first.clone());
        store.record(second.clone());

        assert_eq!(
            store.latest_for_plan(plan_id).map(|j| j.job_id),
            Some(second.job_id)
        );
        assert!(store.get(first.job_id).is_some());
    }

    #[test]
    fn snapshots_grouped_by_plan_and_device() {
        let store = SnapshotStore::new();
        let plan_id = PlanId::new();

        store.insert(plan_id, snapshot("ap-1"));
        store.insert(plan_id, snapshot("ap-2"));

        assert_eq!(store.for_plan(plan_id).len(), 2);
        assert!(store.for_device(plan_id, &DeviceId::from("ap-2")).is_some());
        assert!(store.for_device(plan_id, &DeviceId::from("ap-9")).is_none());
        assert!(store.for_plan(PlanId::new()).is_empty());
    }
}
