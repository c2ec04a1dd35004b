//! The `ChangeApplier` capability interface.
//!
//! One applier per configuration domain. The executor drives the
//! snapshot → apply → health-check → rollback sequence through this trait
//! and never looks inside a domain.

use crate::device::{DeviceEnvironment, DeviceInfo, Transport};
use crate::error::ApplierError;
use async_trait::async_trait;
use rollout_core::model::{
    DeviceId, DeviceSnapshot, HealthReport, Operation, Preview, RiskLevel,
};
use serde_json::Value;
use std::time::Duration;

/// Parameters that passed a domain's validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedParams {
    pub operation: Operation,
    pub fields: Value,
}

/// Blast-radius signals available at risk-assessment time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlastRadius {
    /// Devices targeted by the plan
    pub device_count: usize,
    /// Active clients on the device under assessment
    pub active_clients: u32,
}

/// Result of one apply call.
///
/// `Failed` is a clean refusal: the device reported the change did not
/// take, and nothing confirmed changed. Transport or internal errors come
/// back as `Err` instead and are treated as unexpected by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Success,
    Failed { detail: String },
}

/// Result of one rollback call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    Success,
    /// Some fields restored, some not
    Partial { detail: String },
    Failed { detail: String },
}

/// Deterministic baseline risk shared by the built-in appliers.
///
/// Production environments, active-client impact, and destructive
/// operations escalate toward `High`; creation in non-production defaults
/// to `Medium`.
pub fn baseline_risk(
    operation: Operation,
    environment: DeviceEnvironment,
    blast: &BlastRadius,
) -> RiskLevel {
    let clients_impacted = blast.active_clients > 0;

    if environment.is_production() && (operation.is_destructive() || clients_impacted) {
        return RiskLevel::High;
    }
    if operation.is_destructive() && clients_impacted {
        return RiskLevel::High;
    }
    RiskLevel::Medium
}

/// Per-domain capability: validate, assess risk, preview, snapshot, apply,
/// health-check, rollback.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    /// Domain key this applier is registered under, e.g. `wireless`
    fn domain(&self) -> &'static str;

    /// Validate raw change parameters, listing every violated constraint
    fn validate_params(
        &self,
        operation: Operation,
        params: &Value,
    ) -> Result<ValidatedParams, ApplierError>;

    /// Deterministic risk classification for one device
    fn assess_risk(
        &self,
        operation: Operation,
        device: &DeviceInfo,
        blast: &BlastRadius,
    ) -> RiskLevel {
        baseline_risk(operation, device.environment, blast)
    }

    /// Human-readable description of the intended change for one device,
    /// produced before any device is touched
    fn generate_preview(
        &self,
        device_id: &DeviceId,
        params: &ValidatedParams,
    ) -> Preview;

    /// Capture enough state to fully reverse this change category
    async fn create_snapshot(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
    ) -> Result<DeviceSnapshot, ApplierError>;

    /// Apply the change. Either the target resource reaches the desired
    /// state or the call reports failure; never partially apply and
    /// silently continue.
    async fn apply(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        params: &ValidatedParams,
    ) -> Result<ApplyOutcome, ApplierError>;

    /// Post-apply verification: management-plane reachability plus the
    /// touched subsystem still operating
    async fn health_check(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        timeout: Duration,
    ) -> Result<HealthReport, ApplierError>;

    /// Restore device state from a snapshot
    async fn rollback(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        snapshot: &DeviceSnapshot,
    ) -> Result<RollbackOutcome, ApplierError>;
}
