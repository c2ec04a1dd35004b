//! Scriptable in-memory stand-ins for transports, the device registry,
//! and a whole applier.
//!
//! Used by the engine's tests and the simulator binary. Scripts describe
//! what each step should do per device; everything defaults to success.

use crate::applier::{ApplyOutcome, ChangeApplier, RollbackOutcome, ValidatedParams};
use crate::device::{
    DeviceEnvironment, DeviceInfo, DeviceRegistry, Transport, TransportFactory, TransportHandle,
};
use crate::error::{ApplierError, TransportError};
use crate::snapshot;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rollout_core::model::{
    DeviceId, DeviceSnapshot, HealthReport, HealthState, Operation, Preview,
};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// In-memory transport over a path → JSON document map
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<Map<String, Value>>,
    fail_fetch_paths: Mutex<HashSet<String>>,
    fail_submit_paths: Mutex<HashSet<String>>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a configuration path
    pub fn seed(&self, path: &str, value: Value) {
        self.state.lock().insert(path.to_string(), value);
    }

    /// Make every fetch of `path` fail with a transient error
    pub fn fail_fetches_at(&self, path: &str) {
        self.fail_fetch_paths.lock().insert(path.to_string());
    }

    /// Make every submit to `path` fail with a transient error
    pub fn fail_submits_at(&self, path: &str) {
        self.fail_submit_paths.lock().insert(path.to_string());
    }

    /// Delay every fetch, for timeout exercises
    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Current value at a path, for assertions
    pub fn peek(&self, path: &str) -> Value {
        self.state.lock().get(path).cloned().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, path: &str) -> Result<Value, TransportError> {
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch_paths.lock().contains(path) {
            return Err(TransportError::Transient(format!(
                "scripted fetch failure at {path}"
            )));
        }
        Ok(self.peek(path))
    }

    async fn submit(&self, path: &str, payload: Value) -> Result<(), TransportError> {
        if self.fail_submit_paths.lock().contains(path) {
            return Err(TransportError::Transient(format!(
                "scripted submit failure at {path}"
            )));
        }
        self.state.lock().insert(path.to_string(), payload);
        Ok(())
    }
}

/// Transport factory handing out exclusive leases on mock transports.
///
/// Transports are created on demand and survive across leases, so tests
/// can script them before execution and inspect them after.
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    transports: DashMap<DeviceId, Arc<MockTransport>>,
    leases: Arc<DashMap<DeviceId, ()>>,
    refuse: Mutex<HashSet<DeviceId>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The transport backing a device (created if absent)
    pub fn transport_for(&self, device_id: &DeviceId) -> Arc<MockTransport> {
        self.transports
            .entry(device_id.clone())
            .or_insert_with(|| Arc::new(MockTransport::new()))
            .clone()
    }

    /// Make acquisition fail for a device
    pub fn refuse(&self, device_id: &DeviceId) {
        self.refuse.lock().insert(device_id.clone());
    }

    /// Number of transports currently leased out
    pub fn active_leases(&self) -> usize {
        self.leases.len()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn acquire(&self, device_id: &DeviceId) -> Result<TransportHandle, TransportError> {
        if self.refuse.lock().contains(device_id) {
            return Err(TransportError::Permanent(format!(
                "scripted acquire failure for {device_id}"
            )));
        }
        if self.leases.insert(device_id.clone(), ()).is_some() {
            return Err(TransportError::Permanent(format!(
                "transport for {device_id} is already leased"
            )));
        }

        let transport = self.transport_for(device_id);
        let leases = Arc::clone(&self.leases);
        let device = device_id.clone();
        Ok(TransportHandle::new(transport, move || {
            leases.remove(&device);
        }))
    }
}

/// Fixed device registry over a prebuilt table
#[derive(Debug, Default)]
pub struct StaticDeviceRegistry {
    devices: DashMap<DeviceId, DeviceInfo>,
}

impl StaticDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, info: DeviceInfo) -> Self {
        self.devices.insert(info.id.clone(), info);
        self
    }

    /// Convenience: a lab device with no clients
    pub fn with_lab_device(self, id: &str) -> Self {
        self.with_device(DeviceInfo {
            id: DeviceId::from(id),
            environment: DeviceEnvironment::Lab,
            capability_flags: vec!["wireless".to_string(), "firewall".to_string()],
            active_clients: 0,
        })
    }
}

#[async_trait]
impl DeviceRegistry for StaticDeviceRegistry {
    async fn get_device(&self, device_id: &DeviceId) -> Result<DeviceInfo, ApplierError> {
        self.devices
            .get(device_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ApplierError::UnknownDevice(device_id.to_string()))
    }
}

/// What a scripted step should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedSnapshot {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedApply {
    Success,
    Failed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedHealth {
    Healthy,
    Degraded,
    Failed,
    Error,
    /// Sleep this long before answering; combined with a shorter timeout
    /// this exercises the hang path
    HangMs(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedRollback {
    Success,
    Partial,
    Failed,
    Error,
}

/// Per-device behavior script; defaults to the happy path
#[derive(Debug, Clone, Copy)]
pub struct DeviceScript {
    pub snapshot: ScriptedSnapshot,
    pub apply: ScriptedApply,
    pub health: ScriptedHealth,
    pub rollback: ScriptedRollback,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            snapshot: ScriptedSnapshot::Ok,
            apply: ScriptedApply::Success,
            health: ScriptedHealth::Healthy,
            rollback: ScriptedRollback::Success,
        }
    }
}

/// Fully scriptable applier for executor tests and the simulator.
///
/// Records apply start order/time and rollback invocation counts so tests
/// can assert batch pacing and the rollback-exactly-once property.
#[derive(Debug, Default)]
pub struct MockApplier {
    scripts: DashMap<DeviceId, DeviceScript>,
    rollback_calls: DashMap<DeviceId, usize>,
    apply_log: Mutex<Vec<(DeviceId, Instant)>>,
}

impl MockApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, device_id: &DeviceId, script: DeviceScript) {
        self.scripts.insert(device_id.clone(), script);
    }

    pub fn fail_snapshot(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.snapshot = ScriptedSnapshot::Error);
    }

    pub fn fail_apply(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.apply = ScriptedApply::Failed);
    }

    pub fn error_apply(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.apply = ScriptedApply::Error);
    }

    pub fn degrade_health(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.health = ScriptedHealth::Degraded);
    }

    pub fn fail_health(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.health = ScriptedHealth::Failed);
    }

    pub fn hang_health(&self, device_id: &DeviceId, ms: u64) {
        self.update(device_id, |s| s.health = ScriptedHealth::HangMs(ms));
    }

    pub fn fail_rollback(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.rollback = ScriptedRollback::Failed);
    }

    pub fn partial_rollback(&self, device_id: &DeviceId) {
        self.update(device_id, |s| s.rollback = ScriptedRollback::Partial);
    }

    /// How many times rollback ran for a device
    pub fn rollback_count(&self, device_id: &DeviceId) -> usize {
        self.rollback_calls
            .get(device_id)
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }

    /// Apply start events in order
    pub fn apply_log(&self) -> Vec<(DeviceId, Instant)> {
        self.apply_log.lock().clone()
    }

    fn update(&self, device_id: &DeviceId, f: impl FnOnce(&mut DeviceScript)) {
        let mut entry = self.scripts.entry(device_id.clone()).or_default();
        f(entry.value_mut());
    }

    fn script_for(&self, device_id: &DeviceId) -> DeviceScript {
        self.scripts
            .get(device_id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChangeApplier for MockApplier {
    fn domain(&self) -> &'static str {
        "mock"
    }

    fn validate_params(
        &self,
        operation: Operation,
        params: &Value,
    ) -> Result<ValidatedParams, ApplierError> {
        Ok(ValidatedParams {
            operation,
            fields: params.clone(),
        })
    }

    fn generate_preview(&self, device_id: &DeviceId, params: &ValidatedParams) -> Preview {
        Preview {
            device_id: device_id.clone(),
            operation: params.operation,
            lines: vec![format!("mock {} on {device_id}", params.operation)],
        }
    }

    async fn create_snapshot(
        &self,
        _transport: &dyn Transport,
        device_id: &DeviceId,
    ) -> Result<DeviceSnapshot, ApplierError> {
        match self.script_for(device_id).snapshot {
            ScriptedSnapshot::Ok => {
                Ok(snapshot::capture(device_id, &json!({"device": device_id.as_str()}))?)
            }
            ScriptedSnapshot::Error => Err(ApplierError::Internal(format!(
                "scripted snapshot failure for {device_id}"
            ))),
        }
    }

    async fn apply(
        &self,
        _transport: &dyn Transport,
        device_id: &DeviceId,
        _params: &ValidatedParams,
    ) -> Result<ApplyOutcome, ApplierError> {
        self.apply_log
            .lock()
            .push((device_id.clone(), Instant::now()));

        match self.script_for(device_id).apply {
            ScriptedApply::Success => Ok(ApplyOutcome::Success),
            ScriptedApply::Failed => Ok(ApplyOutcome::Failed {
                detail: format!("scripted apply refusal for {device_id}"),
            }),
            ScriptedApply::Error => Err(ApplierError::Internal(format!(
                "scripted apply error for {device_id}"
            ))),
        }
    }

    async fn health_check(
        &self,
        _transport: &dyn Transport,
        device_id: &DeviceId,
        timeout: Duration,
    ) -> Result<HealthReport, ApplierError> {
        match self.script_for(device_id).health {
            ScriptedHealth::Healthy => Ok(HealthReport::healthy()),
            ScriptedHealth::Degraded => Ok(HealthReport {
                state: HealthState::Degraded,
                checks: Vec::new(),
            }),
            ScriptedHealth::Failed => Ok(HealthReport::failed(format!(
                "scripted health failure for {device_id}"
            ))),
            ScriptedHealth::Error => Err(ApplierError::Internal(format!(
                "scripted health error for {device_id}"
            ))),
            ScriptedHealth::HangMs(ms) => {
                let hang = tokio::time::sleep(Duration::from_millis(ms));
                match tokio::time::timeout(timeout, hang).await {
                    Ok(()) => Ok(HealthReport::healthy()),
                    Err(_) => Ok(HealthReport::failed(format!(
                        "health check timed out after {timeout:?} on {device_id}"
                    ))),
                }
            }
        }
    }

    async fn rollback(
        &self,
        _transport: &dyn Transport,
        device_id: &DeviceId,
        _snapshot: &DeviceSnapshot,
    ) -> Result<RollbackOutcome, ApplierError> {
        *self
            .rollback_calls
            .entry(device_id.clone())
            .or_insert(0)
            .value_mut() += 1;

        match self.script_for(device_id).rollback {
            ScriptedRollback::Success => Ok(RollbackOutcome::Success),
            ScriptedRollback::Partial => Ok(RollbackOutcome::Partial {
                detail: format!("scripted partial rollback for {device_id}"),
            }),
            ScriptedRollback::Failed => Ok(RollbackOutcome::Failed {
                detail: format!("scripted rollback failure for {device_id}"),
            }),
            ScriptedRollback::Error => Err(ApplierError::Internal(format!(
                "scripted rollback error for {device_id}"
            ))),
        }
    }
}
