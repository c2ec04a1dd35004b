//! Firewall applier: filter rule add / modify / remove.
//!
//! Rules are keyed by their comment, which the device treats as a stable
//! identifier. The snapshot captures the full filter table.

use crate::applier::{ApplyOutcome, ChangeApplier, RollbackOutcome, ValidatedParams};
use crate::device::Transport;
use crate::error::ApplierError;
use crate::snapshot;
use async_trait::async_trait;
use rollout_core::model::{
    DeviceId, DeviceSnapshot, HealthCheckItem, HealthReport, HealthState, Operation, Preview,
};
use serde_json::{json, Value};
use std::time::Duration;

/// Configuration tree path of the filter rule table
pub const FILTER_TABLE: &str = "/ip/firewall/filter";
/// Management-plane reachability probe path
pub const SYSTEM_RESOURCE: &str = "/system/resource";

const CHAINS: [&str; 3] = ["input", "forward", "output"];
const ACTIONS: [&str; 3] = ["accept", "drop", "reject"];

#[derive(Debug, Default)]
pub struct FirewallApplier;

impl FirewallApplier {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_rules(&self, transport: &dyn Transport) -> Result<Vec<Value>, ApplierError> {
        match transport.fetch(FILTER_TABLE).await? {
            Value::Null => Ok(Vec::new()),
            Value::Array(rules) => Ok(rules),
            other => Err(ApplierError::Internal(format!(
                "filter table is not an array: {other}"
            ))),
        }
    }
}

fn rule_comment(rule: &Value) -> Option<&str> {
    rule.get("comment").and_then(Value::as_str)
}

#[async_trait]
impl ChangeApplier for FirewallApplier {
    fn domain(&self) -> &'static str {
        "firewall"
    }

    fn validate_params(
        &self,
        operation: Operation,
        params: &Value,
    ) -> Result<ValidatedParams, ApplierError> {
        let mut violations = Vec::new();

        let comment = params.get("comment").and_then(Value::as_str).unwrap_or("");
        if comment.is_empty() {
            violations.push("comment is required (rules are keyed by comment)".to_string());
        }

        if operation != Operation::Remove {
            let chain = params.get("chain").and_then(Value::as_str).unwrap_or("");
            if !CHAINS.contains(&chain) {
                violations.push(format!("chain must be one of {CHAINS:?}, got {chain:?}"));
            }
            let action = params.get("action").and_then(Value::as_str).unwrap_or("");
            if !ACTIONS.contains(&action) {
                violations.push(format!("action must be one of {ACTIONS:?}, got {action:?}"));
            }
        }

        if !violations.is_empty() {
            return Err(ApplierError::Validation(violations));
        }

        let fields = match operation {
            Operation::Remove => json!({ "comment": comment }),
            _ => {
                let mut rule = params.clone();
                rule["comment"] = json!(comment);
                rule
            }
        };

        Ok(ValidatedParams { operation, fields })
    }

    fn generate_preview(&self, device_id: &DeviceId, params: &ValidatedParams) -> Preview {
        let comment = params
            .fields
            .get("comment")
            .and_then(Value::as_str)
            .unwrap_or("?");

        let lines = match params.operation {
            Operation::Create => {
                let chain = params.fields.get("chain").and_then(Value::as_str).unwrap_or("?");
                let action = params.fields.get("action").and_then(Value::as_str).unwrap_or("?");
                vec![format!(
                    "add rule {comment:?} to chain {chain} ({action}) on {device_id}"
                )]
            }
            Operation::Modify => vec![format!("modify rule {comment:?} on {device_id}")],
            Operation::Remove => vec![format!("remove rule {comment:?} from {device_id}")],
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
        let table = transport.fetch(FILTER_TABLE).await?;
        let snapshot = snapshot::capture(device_id, &table)?;
        tracing::debug!(
            device = %device_id,
            snapshot_id = %snapshot.snapshot_id,
            "firewall snapshot captured"
        );
        Ok(snapshot)
    }

    async fn apply(
        &self,
        transport: &dyn Transport,
        device_id: &DeviceId,
        params: &ValidatedParams,
    ) -> Result<ApplyOutcome, ApplierError> {
        let comment = params
            .fields
            .get("comment")
            .and_then(Value::as_str)
            .ok_or_else(|| ApplierError::Internal("validated params lost comment".to_string()))?;

        let mut rules = self.fetch_rules(transport).await?;
        let position = rules.iter().position(|r| rule_comment(r) == Some(comment));

        match params.operation {
            Operation::Create => {
                if position.is_some() {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("rule {comment:?} already exists"),
                    });
                }
                rules.push(params.fields.clone());
            }
            Operation::Modify => match position {
                Some(idx) => rules[idx] = params.fields.clone(),
                None => {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("rule {comment:?} does not exist"),
                    })
                }
            },
            Operation::Remove => match position {
                Some(idx) => {
                    rules.remove(idx);
                }
                None => {
                    return Ok(ApplyOutcome::Failed {
                        detail: format!("rule {comment:?} does not exist"),
                    })
                }
            },
        }

        transport.submit(FILTER_TABLE, Value::Array(rules)).await?;

        let readback = self.fetch_rules(transport).await?;
        let present = readback.iter().any(|r| rule_comment(r) == Some(comment));
        let want_present = params.operation != Operation::Remove;
        if present != want_present {
            return Ok(ApplyOutcome::Failed {
                detail: format!("change to rule {comment:?} did not take"),
            });
        }

        tracing::debug!(device = %device_id, comment, op = %params.operation, "firewall change applied");
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

            // the filter table must still be readable and well-formed;
            // a device that locked us out mid-change shows up here
            let state = match transport.fetch(FILTER_TABLE).await {
                Ok(Value::Array(_)) | Ok(Value::Null) => {
                    checks.push(HealthCheckItem {
                        name: "filter_table".to_string(),
                        passed: true,
                        detail: None,
                    });
                    HealthState::Healthy
                }
                Ok(_) => {
                    checks.push(HealthCheckItem {
                        name: "filter_table".to_string(),
                        passed: false,
                        detail: Some("filter table malformed".to_string()),
                    });
                    HealthState::Degraded
                }
                Err(err) => {
                    checks.push(HealthCheckItem {
                        name: "filter_table".to_string(),
                        passed: false,
                        detail: Some(err.to_string()),
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

        if let Err(err) = transport.submit(FILTER_TABLE, table.clone()).await {
            return Ok(RollbackOutcome::Failed {
                detail: format!("restore write failed: {err}"),
            });
        }

        match transport.fetch(FILTER_TABLE).await {
            Ok(readback) if readback == table => {
                tracing::info!(device = %device_id, snapshot_id = %snapshot.snapshot_id, "firewall rollback complete");
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
