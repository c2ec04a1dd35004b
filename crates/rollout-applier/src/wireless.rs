//! Wireless applier: SSID create / modify / remove.
//!
//! Reference implementation of [`ChangeApplier`]. The snapshot captures
//! the entire wireless interface table, not just the touched SSID, so a
//! rollback can reverse any change in the category.

use crate::applier::{ApplyOutcome, ChangeApplier, RollbackOutcome, ValidatedParams};
use crate::device::Transport;
use crate::error::ApplierError;
use crate::snapshot;
use async_trait::async_trait;
use rollout_core::model::{
    DeviceId, DeviceSnapshot, HealthCheckItem, HealthReport, HealthState, Operation, Preview,
};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Configuration tree path of the wireless interface table
pub const WIRELESS_TABLE: &str = "/interface/wireless";
/// Management-plane reachability probe path
pub const SYSTEM_RESOURCE: &str = "/system/resource";

const BANDS: [&str; 3] = ["2ghz", "5ghz", "dual"];
const SECURITY_MODES: [&str; 3] = ["open", "wpa2", "wpa3"];

#[derive(Debug, Default)]
pub struct WirelessApplier;

impl WirelessApplier {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_table(&self, transport: &dyn Transport) -> Result<Map<String, Value>, ApplierError> {
        let table = transport.fetch(WIRELESS_TABLE).await?;
        match table {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map),
            other => Err(ApplierError::Internal(format!(
                "wireless table is not an object: {other}"
            ))),
        }
    }
}

#[async_trait]
impl ChangeApplier for WirelessApplier {
    fn domain(&self) -> &'static str {
        "wireless"
    }

    fn validate_params(
        &self,
        operation: Operation,
        params: &Value,
    ) -> Result<ValidatedParams, ApplierError> {
        let mut violations = Vec::new();

        let ssid = params.get("ssid").and_then(Value::as_str).unwrap_or("");
        if ssid.is_empty() {
            violations.push("ssid is required".to_string());
        } else if ssid.len() > 32 {
            violations.push(format!("ssid exceeds 32 bytes: {} bytes", ssid.len()));
        } else if ssid.trim() != ssid {
            violations.push("ssid must not have leading or trailing whitespace".to_string());
        }

        let band = params
            .get("band")
            .and_then(Value::as_str)
            .unwrap_or("dual");
        if !BANDS.contains(&band) {
            violations.push(format!("band must be one of {BANDS:?}, got {band:?}"));
        }

        let security = params
            .get("security")
            .and_then(Value::as_str)
            .unwrap_or("wpa2");
        if !SECURITY_MODES.contains(&security) {
            violations.push(format!(
                "security must be one of {SECURITY_MODES:?}, got {security:?}"
            ));
        }

        let passphrase = params.get("passphrase").and_then(Value::as_str);
        if operation != Operation::Remove && security != "open" {
            match passphrase {
                None => violations.push("passphrase is required unless security is open".to_string()),
                Some(p) if p.len() < 8 => {
                    violations.push("passphrase must be at least 8 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if !violations.is_empty() {
            return Err(ApplierError::Validation(violations));
        }

        let fields = match operation {
            Operation::Remove => json!({ "ssid": ssid }),
            _ => json!({
                "ssid": ssid,
                "band": band,
                "security": security,
                "passphrase": passphrase,
            }),
        };

        Ok(ValidatedParams { operation, fields })
    }

    fn generate_preview(&self, device_id: &DeviceId, params: &ValidatedParams) -> Preview {
        let ssid = params
            .fields
            .get("ssid")
            .and_then(Value::as_str)
            .unwrap_or("?");

        let lines = match params.operation {
            Operation::Create => {
                let band = params.fields.get("band").and_then(Value::as_str).unwrap_or("dual");
                let security = params
                    .fields
                    .get("security")
                    .and_then(Value::as_str)
                    .unwrap_or("wpa2");
                vec![
                    format!("create SSID {ssid:?} on {device_id}"),
                    format!("band: {band}, security: {security}"),
                ]
            }
            Operation::Modify => vec![format!("modify SSID {ssid:?} on {device_id}")],
            Operation::Remove => vec![
                format!("remove SSID {ssid:?} from {device_id}"),
                "associated clients will be disconnected".to_string(),
            ],
        };

        Preview {
            device_id: device_id.clone(),
            operation: params.operation,
            lines,
        }
    }

    async fn create_snapshot(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
    ) -> Result<DeviceSnapshot, ApplierError> {
        // the whole interface table, so any SSID change can be reversed
        let table = transport.fetch(WIRELESS_TABLE).await?;
        let snapshot = snapshot::capture(device_id, &table)?;
        tracing::debug!(
            device = %device_id,
            snapshot_id = %snapshot.snapshot_id,
            "wireless snapshot captured"
        );
        Ok(snapshot)
    }

    async fn apply(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        params: &ValidatedParams,
    ) -> Result<ApplyOutcome, ApplierError> {
        let ssid = params
            .fields
            .get("ssid")
            .and_then(Value::as_str)
            .ok_or_else(|| ApplierError::Internal("validated params lost ssid".to_string()))?;

        let mut table = self.fetch_table(transport).await?;

        match params.operation {
            Operation::Create => {
                if table.contains_key(ssid) {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("ssid {ssid:?} already exists"),
                    });
                }
                let mut entry = params.fields.clone();
                entry["running"] = json!(true);
                entry["disabled"] = json!(false);
                table.insert(ssid.to_string(), entry);
            }
            Operation::Modify => {
                let Some(entry) = table.get_mut(ssid) else {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("ssid {ssid:?} does not exist"),
                    });
                };
                if let (Value::Object(existing), Value::Object(new_fields)) =
                    (entry, &params.fields)
                {
                    for (key, value) in new_fields {
                        if !value.is_null() {
                            existing.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Operation::Remove => {
                if table.remove(ssid).is_none() {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("ssid {ssid:?} does not exist"),
                    });
                }
            }
        }

        transport.submit(WIRELESS_TABLE, Value::Object(table)).await?;

        // read back: either the resource reached the desired state or we
        // report failure, never a silent partial apply
        let readback = self.fetch_table(transport).await?;
        let present = readback.contains_key(ssid);
        let want_present = params.operation != Operation::Remove;
        if present != want_present {
            return Ok(ApplyOutcome::Failed {
                detail: format!("change to ssid {ssid:?} did not take"),
            });
        }

        tracing::debug!(device = %device_id, ssid, op = %params.operation, "wireless change applied");
        Ok(ApplyOutcome::Success)
    }

    async fn health_check(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        timeout: Duration,
    ) -> Result<HealthReport, ApplierError> {
        let probes = async {
            let mut checks = Vec::new();

            let reachable = transport.fetch(SYSTEM_RESOURCE).await.is_ok();
            checks.push(HealthCheckItem {
                name: "management_plane".to_string(),
                passed: reachable,
                detail: (!reachable).then(|| "device unreachable".to_string()),
            });
            if !reachable {
                return HealthReport {
                    state: HealthState::Failed,
                    checks,
                };
            }

            let state = match self.fetch_table(transport).await {
                Ok(table) => {
                    let mut unknown = 0usize;
                    let mut stopped = 0usize;
                    for entry in table.values() {
                        let disabled = entry
                            .get("disabled")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                        if disabled {
                            continue;
                        }
                        match entry.get("running").and_then(Value::as_bool) {
                            Some(true) => {}
                            Some(false) => stopped += 1,
                            None => unknown += 1,
                        }
                    }
                    checks.push(HealthCheckItem {
                        name: "wireless_running".to_string(),
                        passed: stopped == 0,
                        detail: (stopped > 0 || unknown > 0)
                            .then(|| format!("{stopped} stopped, {unknown} unknown")),
                    });
                    if stopped > 0 {
                        HealthState::Failed
                    } else if unknown > 0 {
                        HealthState::Degraded
                    } else {
                        HealthState::Healthy
                    }
                }
                Err(_) => {
                    checks.push(HealthCheckItem {
                        name: "wireless_running".to_string(),
                        passed: false,
                        detail: Some("wireless table unreadable".to_string()),
                    });
                    HealthState::Failed
                }
            };

            HealthReport { state, checks }
        };

        match tokio::time::timeout(timeout, probes).await {
            Ok(report) => Ok(report),
            Err(_) => Ok(HealthReport::failed(format!(
                "health check timed out after {timeout:?} on {device_id}"
            ))),
        }
    }

    async fn rollback(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        snapshot: &DeviceSnapshot,
    ) -> Result<RollbackOutcome, ApplierError> {
        let table = match snapshot::restore(snapshot) {
            Ok(table) => table,
            Err(err) => {
                return Ok(RollbackOutcome::Failed {
                    detail: format!("snapshot unusable: {err}"),
                })
            }
        };

        if let Err(err) = transport.submit(WIRELESS_TABLE, table.clone()).await {
            return Ok(RollbackOutcome::Failed {
                detail: format!("restore write failed: {err}"),
            });
        }

        match transport.fetch(WIRELESS_TABLE).await {
            Ok(readback) if readback == table => {
                tracing::info!(device = %device_id, snapshot_id = %snapshot.snapshot_id, "wireless rollback complete");
                Ok(RollbackOutcome::Success)
            }
            Ok(_) => Ok(RollbackOutcome::Partial {
                detail: "restored table differs on read-back".to_string(),
            }),
            Err(err) => Ok(RollbackOutcome::Partial {
                detail: format!("restore written but unverified: {err}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn applier() -> WirelessApplier {
        WirelessApplier::new()
    }

    fn create_params() -> ValidatedParams {
        applier()
            .validate_params(
                Operation::Create,
                &json!({"ssid": "guest", "band": "dual", "security": "wpa2", "passphrase": "s3cret-pw"}),
            )
            .unwrap()
    }

    #[test]
    fn validate_collects_every_violation() {
        let err = applier()
            .validate_params(
                Operation::Create,
                &json!({"ssid": "", "band": "9ghz", "security": "wep"}),
            )
            .unwrap_err();

        match err {
            ApplierError::Validation(violations) => {
                // ssid, band, security, missing passphrase
                assert_eq!(violations.len(), 4, "violations: {violations:?}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn remove_only_needs_ssid() {
        let validated = applier()
            .validate_params(Operation::Remove, &json!({"ssid": "guest"}))
            .unwrap();
        assert_eq!(validated.operation, Operation::Remove);
        assert_eq!(validated.fields, json!({"ssid": "guest"}));
    }

    #[test]
    fn preview_mentions_device_and_ssid() {
        let preview = applier().generate_preview(&DeviceId::from("ap-7"), &create_params());
        assert_eq!(preview.operation, Operation::Create);
        assert!(preview.lines[0].contains("guest"));
        assert!(preview.lines[0].contains("ap-7"));
    }

    #[tokio::test]
    async fn apply_create_then_remove() {
        let transport = MockTransport::new();
        let device = DeviceId::from("ap-1");
        let a = applier();

        let outcome = a.apply(&transport, &device, &create_params()).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Success);

        // duplicate create refuses cleanly
        let outcome = a.apply(&transport, &device, &create_params()).await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Failed { .. }));

        let remove = a
            .validate_params(Operation::Remove, &json!({"ssid": "guest"}))
            .unwrap();
        let outcome = a.apply(&transport, &device, &remove).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Success);
    }

    #[tokio::test]
    async fn snapshot_restores_previous_table() {
        let transport = MockTransport::new();
        let device = DeviceId::from("ap-1");
        let a = applier();

        let before = a.create_snapshot(&transport, &device).await.unwrap();
        a.apply(&transport, &device, &create_params()).await.unwrap();

        let outcome = a.rollback(&transport, &device, &before).await.unwrap();
        assert_eq!(outcome, RollbackOutcome::Success);

        let table = transport.fetch(WIRELESS_TABLE).await.unwrap();
        assert_eq!(table, Value::Null);
    }

    #[tokio::test]
    async fn health_is_healthy_after_create() {
        let transport = MockTransport::new();
        let device = DeviceId::from("ap-1");
        let a = applier();

        a.apply(&transport, &device, &create_params()).await.unwrap();
        let report = a
            .health_check(&transport, &device, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.checks.iter().all(|c| c.passed));
    }

    #[tokio::test]
    async fn health_fails_when_unreachable() {
        let transport = MockTransport::new();
        transport.fail_fetches_at(SYSTEM_RESOURCE);
        let report = applier()
            .health_check(&transport, &DeviceId::from("ap-1"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.state, HealthState::Failed);
    }
}
