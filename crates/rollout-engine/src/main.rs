use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, Command};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rollout_applier::device::{DeviceEnvironment, DeviceInfo};
use rollout_core::model::DeviceId;
use rollout_applier::mock::{MockApplier, MockTransportFactory, StaticDeviceRegistry};
use rollout_applier::registry::ApplierRegistry;
use rollout_core::lifecycle::PlanLifecycleManager;
use rollout_core::token::TokenIssuer;
use rollout_engine::orchestrator::{Orchestrator, PlanRequest};
use rollout_engine::executor::ExecutorConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Command::new("rollout-sim")
        .version(rollout_core::VERSION)
        .about("In-memory rollout simulation against mock devices")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Create, approve, and apply one plan over a mock fleet")
                .arg(
                    Arg::new("devices")
                        .long("devices")
                        .default_value("12")
                        .value_parser(value_parser!(usize))
                        .help("Number of mock devices in the fleet"),
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Devices per batch"),
                )
                .arg(
                    Arg::new("pause-ms")
                        .long("pause-ms")
                        .default_value("100")
                        .value_parser(value_parser!(u64))
                        .help("Pause between batches in milliseconds"),
                )
                .arg(
                    Arg::new("fail-rate")
                        .long("fail-rate")
                        .default_value("0.0")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a device fails its post-apply health check"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducible failure injection"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("simulate", matches)) => {
            let devices = *matches
                .get_one::<usize>("devices")
                .ok_or_else(|| anyhow!("missing devices"))?;
            let batch_size = *matches
                .get_one::<usize>("batch-size")
                .ok_or_else(|| anyhow!("missing batch-size"))?;
            let pause_ms = *matches
                .get_one::<u64>("pause-ms")
                .ok_or_else(|| anyhow!("missing pause-ms"))?;
            let fail_rate = *matches
                .get_one::<f64>("fail-rate")
                .ok_or_else(|| anyhow!("missing fail-rate"))?;
            let seed = *matches
                .get_one::<u64>("seed")
                .ok_or_else(|| anyhow!("missing seed"))?;

            simulate(devices, batch_size, pause_ms, fail_rate, seed).await
        }
        _ => Err(anyhow!("unknown subcommand")),
    }
}

async fn simulate(
    device_count: usize,
    batch_size: usize,
    pause_ms: u64,
    fail_rate: f64,
    seed: u64,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);

    let applier = Arc::new(MockApplier::new());
    let mut device_registry = StaticDeviceRegistry::new();
    let mut device_ids = Vec::with_capacity(device_count);
    let mut scripted_failures = Vec::new();

    for n in 0..device_count {
        let id = DeviceId::from(format!("sim-ap-{n:03}").as_str());
        device_registry = device_registry.with_device(DeviceInfo {
            id: id.clone(),
            environment: DeviceEnvironment::Lab,
            capability_flags: vec!["wireless".to_string()],
            active_clients: 0,
        });
        if rng.gen_bool(fail_rate.clamp(0.0, 1.0)) {
            applier.fail_health(&id);
            scripted_failures.push(id.clone());
        }
        device_ids.push(id);
    }

    let mut appliers = ApplierRegistry::new();
    appliers.register(applier.clone());

    let lifecycle = Arc::new(PlanLifecycleManager::new(TokenIssuer::generate()));
    let orchestrator = Orchestrator::new(
        lifecycle,
        appliers,
        Arc::new(device_registry),
        Arc::new(MockTransportFactory::new()),
        ExecutorConfig {
            batch_size,
            batch_pause: Duration::from_millis(pause_ms),
            health_timeout: Duration::from_secs(5),
        },
    );

    let plan = orchestrator
        .create_plan(PlanRequest {
            tool_name: "mock.create".to_string(),
            created_by: "simulator".to_string(),
            device_ids,
            summary: format!("simulated rollout over {device_count} devices"),
            params: json!({"ssid": "sim-guest", "band": "5ghz"}),
        })
        .await?;

    tracing::info!(
        plan_id = %plan.id,
        risk = ?plan.risk_level,
        scripted_failures = scripted_failures.len(),
        "plan created"
    );

    let token = plan.approval.token.clone();
    orchestrator.approve_plan(plan.id, &token, "sim-operator")?;
    let report = orchestrator.apply_plan(plan.id, &token).await?;

    println!("plan:        {}", report.plan_id);
    println!("job:         {}", report.job_id);
    println!("final:       {:?}", report.final_status);
    println!("succeeded:   {}", report.successful_devices.len());
    println!("failed:      {}", report.failed_devices.len());
    println!("rolled back: {}", report.rolled_back_devices.len());
    for device in &report.rolled_back_devices {
        println!("  restored {device}");
    }
    Ok(())
}
