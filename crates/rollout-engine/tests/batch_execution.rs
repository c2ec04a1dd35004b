//! Batched execution scenarios over a scripted mock fleet.

use rollout_applier::mock::{MockApplier, MockTransportFactory, StaticDeviceRegistry};
use rollout_applier::registry::ApplierRegistry;
use rollout_core::lifecycle::PlanLifecycleManager;
use rollout_core::model::{DeviceApplyStatus, DeviceId, PlanId, PlanStatus};
use rollout_core::token::TokenIssuer;
use rollout_engine::executor::ExecutorConfig;
use rollout_engine::orchestrator::{Orchestrator, PlanRequest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    applier: Arc<MockApplier>,
    factory: Arc<MockTransportFactory>,
}

fn fixture(device_names: &[&str], config: ExecutorConfig) -> Fixture {
    let applier = Arc::new(MockApplier::new());
    let mut devices = StaticDeviceRegistry::new();
    for name in device_names {
        devices = devices.with_lab_device(name);
    }
    let mut appliers = ApplierRegistry::new();
    appliers.register(applier.clone());

    let factory = Arc::new(MockTransportFactory::new());
    let lifecycle = Arc::new(PlanLifecycleManager::new(TokenIssuer::generate()));
    let orchestrator = Arc::new(Orchestrator::new(
        lifecycle,
        appliers,
        Arc::new(devices),
        factory.clone(),
        config,
    ));
    Fixture {
        orchestrator,
        applier,
        factory,
    }
}

fn quick_config(batch_size: usize) -> ExecutorConfig {
    ExecutorConfig {
        batch_size,
        batch_pause: Duration::from_millis(10),
        health_timeout: Duration::from_millis(500),
    }
}

async fn approved_plan(fx: &Fixture, devices: &[&str]) -> (PlanId, String) {
    let plan = fx
        .orchestrator
        .create_plan(PlanRequest {
            tool_name: "mock.create".to_string(),
            created_by: "alice".to_string(),
            device_ids: devices.iter().map(|d| DeviceId::from(*d)).collect(),
            summary: "scripted rollout".to_string(),
            params: json!({"ssid": "guest"}),
        })
        .await
        .unwrap();
    let token = plan.approval.token.clone();
    fx.orchestrator
        .approve_plan(plan.id, &token, "bob")
        .unwrap();
    (plan.id, token)
}

#[tokio::test]
async fn all_devices_succeed_completes_the_plan() {
    let fx = fixture(&["a", "b", "c"], quick_config(2));
    let (plan_id, token) = approved_plan(&fx, &["a", "b", "c"]).await;

    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Completed);
    assert!(!report.cancelled);
    assert_eq!(report.successful_devices.len(), 3);
    assert!(report.failed_devices.is_empty());
    assert!(report.rolled_back_devices.is_empty());

    let job = fx.orchestrator.latest_job(plan_id).unwrap();
    assert_eq!(job.batches_total, 2);
    assert_eq!(job.batches_completed, 2);
    assert!(job.finished_at.is_some());
}

#[tokio::test]
async fn unhealthy_last_device_is_rolled_back_and_plan_fails() {
    let fx = fixture(&["a", "b", "c"], quick_config(2));
    let c = DeviceId::from("c");
    fx.applier.fail_health(&c);

    let (plan_id, token) = approved_plan(&fx, &["a", "b", "c"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(
        report.successful_devices,
        vec![DeviceId::from("a"), DeviceId::from("b")]
    );
    assert!(report.failed_devices.is_empty());
    assert_eq!(report.rolled_back_devices, vec![c.clone()]);
    assert_eq!(fx.applier.rollback_count(&c), 1);

    let job = fx.orchestrator.latest_job(plan_id).unwrap();
    assert_eq!(job.batches_total, 2);
    assert_eq!(job.batches_completed, 2);
}

#[tokio::test]
async fn snapshot_failure_blocks_the_apply() {
    let fx = fixture(&["a", "b"], quick_config(5));
    let a = DeviceId::from("a");
    fx.applier.fail_snapshot(&a);

    let (plan_id, token) = approved_plan(&fx, &["a", "b"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(report.failed_devices, vec![a.clone()]);
    assert_eq!(report.successful_devices, vec![DeviceId::from("b")]);

    // The apply step never ran for the failed device.
    assert!(fx.applier.apply_log().iter().all(|(d, _)| d != &a));
    assert_eq!(fx.applier.rollback_count(&a), 0);
}

#[tokio::test]
async fn apply_refusal_fails_without_rollback() {
    let fx = fixture(&["a"], quick_config(5));
    let a = DeviceId::from("a");
    fx.applier.fail_apply(&a);

    let (plan_id, token) = approved_plan(&fx, &["a"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(report.failed_devices, vec![a.clone()]);
    assert_eq!(fx.applier.rollback_count(&a), 0);
}

#[tokio::test]
async fn apply_error_triggers_best_effort_rollback() {
    let fx = fixture(&["a"], quick_config(5));
    let a = DeviceId::from("a");
    fx.applier.error_apply(&a);

    let (plan_id, token) = approved_plan(&fx, &["a"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(report.rolled_back_devices, vec![a.clone()]);
    assert_eq!(fx.applier.rollback_count(&a), 1);
}

#[tokio::test]
async fn hung_health_check_times_out_and_rolls_back() {
    let fx = fixture(
        &["a"],
        ExecutorConfig {
            batch_size: 5,
            batch_pause: Duration::from_millis(10),
            health_timeout: Duration::from_millis(50),
        },
    );
    let a = DeviceId::from("a");
    fx.applier.hang_health(&a, 5_000);

    let (plan_id, token) = approved_plan(&fx, &["a"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(report.rolled_back_devices, vec![a.clone()]);
    assert_eq!(fx.applier.rollback_count(&a), 1);
}

#[tokio::test]
async fn degraded_health_still_counts_as_success() {
    let fx = fixture(&["a"], quick_config(5));
    let a = DeviceId::from("a");
    fx.applier.degrade_health(&a);

    let (plan_id, token) = approved_plan(&fx, &["a"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Completed);
    assert_eq!(report.successful_devices, vec![a.clone()]);
    assert_eq!(fx.applier.rollback_count(&a), 0);
}

#[tokio::test]
async fn device_is_marked_rolled_back_even_when_rollback_is_partial() {
    let fx = fixture(&["a"], quick_config(5));
    let a = DeviceId::from("a");
    fx.applier.fail_health(&a);
    fx.applier.partial_rollback(&a);

    let (plan_id, token) = approved_plan(&fx, &["a"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(report.final_status, PlanStatus::Failed);
    assert_eq!(report.rolled_back_devices, vec![a.clone()]);
    let result = &report.device_results[0];
    assert_eq!(result.status, DeviceApplyStatus::RolledBack);
    assert!(result.detail.as_deref().unwrap().contains("partial"));
}

#[tokio::test]
async fn batches_run_in_sequence_with_a_pause_between() {
    let pause = Duration::from_millis(200);
    let fx = fixture(
        &["a", "b", "c", "d"],
        ExecutorConfig {
            batch_size: 2,
            batch_pause: pause,
            health_timeout: Duration::from_millis(500),
        },
    );

    let (plan_id, token) = approved_plan(&fx, &["a", "b", "c", "d"]).await;
    let report = fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();
    assert_eq!(report.final_status, PlanStatus::Completed);

    let log = fx.applier.apply_log();
    assert_eq!(log.len(), 4);

    let first_batch: Vec<&DeviceId> = log[..2].iter().map(|(d, _)| d).collect();
    assert!(first_batch.contains(&&DeviceId::from("a")));
    assert!(first_batch.contains(&&DeviceId::from("b")));

    let batch_one_end = log[..2].iter().map(|(_, t)| *t).max().unwrap();
    let batch_two_start = log[2..].iter().map(|(_, t)| *t).min().unwrap();
    let gap = batch_two_start.duration_since(batch_one_end);
    assert!(gap >= pause - Duration::from_millis(50), "gap was {gap:?}");
}

#[tokio::test]
async fn cancellation_stops_at_the_batch_boundary() {
    let fx = fixture(
        &["a", "b", "c", "d"],
        ExecutorConfig {
            batch_size: 2,
            batch_pause: Duration::from_millis(500),
            health_timeout: Duration::from_millis(500),
        },
    );

    let (plan_id, token) = approved_plan(&fx, &["a", "b", "c", "d"]).await;

    let orchestrator = fx.orchestrator.clone();
    let handle =
        tokio::spawn(async move { orchestrator.apply_plan(plan_id, &token).await.unwrap() });

    // Let the first batch finish, then abort during the inter-batch pause.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(fx.orchestrator.abort_execution(plan_id));

    let report = handle.await.unwrap();
    assert_eq!(report.final_status, PlanStatus::Failed);
    assert!(report.cancelled);
    assert_eq!(report.successful_devices.len(), 2);

    let job = fx.orchestrator.latest_job(plan_id).unwrap();
    assert!(job.cancelled);
    assert_eq!(job.batches_completed, 1);
    let pending: Vec<&DeviceId> = job
        .device_results
        .iter()
        .filter(|r| r.status == DeviceApplyStatus::Pending)
        .map(|r| &r.device_id)
        .collect();
    assert_eq!(pending, vec![&DeviceId::from("c"), &DeviceId::from("d")]);

    // Plan is terminal, never stranded in executing.
    let plan = fx.orchestrator.get_plan(plan_id, None).unwrap();
    assert!(plan.status.is_terminal());
}

#[tokio::test]
async fn transports_are_released_on_every_path() {
    let fx = fixture(&["a", "b", "c"], quick_config(2));
    fx.applier.fail_health(&DeviceId::from("b"));
    fx.applier.fail_snapshot(&DeviceId::from("c"));

    let (plan_id, token) = approved_plan(&fx, &["a", "b", "c"]).await;
    fx.orchestrator.apply_plan(plan_id, &token).await.unwrap();

    assert_eq!(fx.factory.active_leases(), 0);
}

#[tokio::test]
async fn abort_is_a_no_op_for_plans_not_executing() {
    let fx = fixture(&["a"], quick_config(1));
    let (plan_id, _token) = approved_plan(&fx, &["a"]).await;
    assert!(!fx.orchestrator.abort_execution(plan_id));
}

mod partition_properties {
    use proptest::prelude::*;
    use rollout_core::model::DeviceId;
    use rollout_engine::executor::partition;

    proptest! {
        #[test]
        fn partition_covers_every_device_in_order(
            count in 0usize..60,
            batch_size in 1usize..12,
        ) {
            let devices: Vec<DeviceId> = (0..count)
                .map(|n| DeviceId::from(format!("ap-{n}").as_str()))
                .collect();
            let batches = partition(&devices, batch_size);

            let expected_batches = count.div_ceil(batch_size);
            prop_assert_eq!(batches.len(), expected_batches);

            for batch in &batches[..batches.len().saturating_sub(1)] {
                prop_assert_eq!(batch.len(), batch_size);
            }
            let flattened: Vec<DeviceId> =
                batches.into_iter().flatten().collect();
            prop_assert_eq!(flattened, devices);
        }
    }
}
