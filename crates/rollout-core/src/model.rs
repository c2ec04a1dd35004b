//! Core data model for the plan → approve → apply workflow.
//!
//! Defines the fundamental types shared across the workspace:
//! - Plan identity, status, and risk classification
//! - Device snapshots and per-device apply results
//! - Job records aggregating one execution attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique plan identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique job identifier (one execution attempt of a plan)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique snapshot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device identifier (assigned by the external device registry)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse risk classification driving operator review expectations
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Approved,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    /// Terminal statuses admit no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Approved => "approved",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Kind of change a plan performs on its target resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Modify,
    Remove,
}

impl Operation {
    /// Destructive operations touch existing state on the device
    pub fn is_destructive(self) -> bool {
        matches!(self, Operation::Modify | Operation::Remove)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Modify => write!(f, "modify"),
            Operation::Remove => write!(f, "remove"),
        }
    }
}

/// Human-readable description of the intended change for one device,
/// produced at plan creation time before any device is touched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub device_id: DeviceId,
    pub operation: Operation,
    /// One line per intended field change
    pub lines: Vec<String>,
}

/// Domain-specific change payload plus per-device previews.
/// The payload is opaque to the core; only the bound applier interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub params: serde_json::Value,
    pub previews: Vec<Preview>,
}

/// Approval token state attached to a plan.
///
/// The token value is an opaque high-entropy credential; it must never be
/// logged in full. Use [`ApprovalState::fingerprint`] for log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ApprovalState {
    /// Short non-secret prefix of the token, safe for logs
    pub fn fingerprint(&self) -> &str {
        let end = self.token.len().min(8);
        &self.token[..end]
    }
}

/// An immutable-once-approved description of a proposed multi-device change
/// plus its approval/execution state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    /// Which domain operation this plan performs, e.g. `wireless.create`
    pub tool_name: String,
    pub created_by: String,
    pub approved_by: Option<String>,
    /// Ordered, duplicate-free, immutable after creation
    pub device_ids: Vec<DeviceId>,
    pub summary: String,
    pub changes: ChangeSet,
    pub risk_level: RiskLevel,
    pub status: PlanStatus,
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Captured state of one device immediately before a change is applied.
///
/// The payload is gzip-compressed; the checksum is the SHA-256 of the
/// uncompressed payload and must verify on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub snapshot_id: SnapshotId,
    pub device_id: DeviceId,
    pub taken_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    /// SHA-256 hex digest of the uncompressed payload
    pub checksum: String,
}

/// Per-device outcome inside a plan execution.
///
/// Created `Pending` when the device's turn begins, mutated exactly once
/// to a terminal per-device status, never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceApplyStatus {
    Pending,
    Success,
    Failed,
    RolledBack,
}

impl DeviceApplyStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeviceApplyStatus::Pending)
    }
}

impl std::fmt::Display for DeviceApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceApplyStatus::Pending => "pending",
            DeviceApplyStatus::Success => "success",
            DeviceApplyStatus::Failed => "failed",
            DeviceApplyStatus::RolledBack => "rolled_back",
        };
        write!(f, "{s}")
    }
}

/// Post-apply health verdict for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Unhealthy but non-fatal; the change is kept
    Degraded,
    Failed,
}

/// One individual health probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckItem {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Aggregate health-check report for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub checks: Vec<HealthCheckItem>,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            state: HealthState::Healthy,
            checks: Vec::new(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: HealthState::Failed,
            checks: vec![HealthCheckItem {
                name: "health_check".to_string(),
                passed: false,
                detail: Some(detail.into()),
            }],
        }
    }
}

/// Outcome of one device inside a plan execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceApplyResult {
    pub device_id: DeviceId,
    pub status: DeviceApplyStatus,
    /// None when snapshot capture itself failed
    pub snapshot_id: Option<SnapshotId>,
    pub error: Option<String>,
    pub health: Option<HealthReport>,
    /// Extra context, e.g. rollback detail when rollback was only partial
    pub detail: Option<String>,
}

impl DeviceApplyResult {
    pub fn pending(device_id: DeviceId) -> Self {
        Self {
            device_id,
            status: DeviceApplyStatus::Pending,
            snapshot_id: None,
            error: None,
            health: None,
            detail: None,
        }
    }
}

/// One execution attempt of a plan; an immutable history record once the
/// plan reaches a terminal status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub plan_id: PlanId,
    pub device_ids: Vec<DeviceId>,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub device_results: Vec<DeviceApplyResult>,
    /// Set when the run was aborted at a batch boundary; devices in
    /// later batches keep their `Pending` results
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(PlanStatus::Completed.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
        assert!(PlanStatus::Cancelled.is_terminal());
        assert!(!PlanStatus::Pending.is_terminal());
        assert!(!PlanStatus::Approved.is_terminal());
        assert!(!PlanStatus::Executing.is_terminal());
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(
            RiskLevel::High,
            RiskLevel::Low.max(RiskLevel::High).max(RiskLevel::Medium)
        );
    }

    #[test]
    fn destructive_operations() {
        assert!(Operation::Remove.is_destructive());
        assert!(Operation::Modify.is_destructive());
        assert!(!Operation::Create.is_destructive());
    }

    #[test]
    fn approval_fingerprint_truncates() {
        let approval = ApprovalState {
            token: "deadbeefcafe0123".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert_eq!(approval.fingerprint(), "deadbeef");
    }

    #[test]
    fn device_result_starts_pending() {
        let result = DeviceApplyResult::pending(DeviceId::from("sw-01"));
        assert_eq!(result.status, DeviceApplyStatus::Pending);
        assert!(!result.status.is_terminal());
        assert!(result.snapshot_id.is_none());
    }
}
