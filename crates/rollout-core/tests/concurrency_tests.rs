//! At-most-once execution guarantee under contention.

use rollout_core::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn seed_plan(mgr: &PlanLifecycleManager) -> Plan {
    mgr.create_plan(NewPlan {
        tool_name: "firewall.modify".to_string(),
        created_by: "alice".to_string(),
        device_ids: vec![DeviceId::from("gw-1"), DeviceId::from("gw-2")],
        summary: "tighten wan input chain".to_string(),
        changes: ChangeSet {
            params: json!({"chain": "input", "action": "drop"}),
            previews: vec![],
        },
        risk_level: RiskLevel::High,
    })
    .unwrap()
}

#[test]
fn concurrent_begin_execution_has_exactly_one_winner() {
    // Run the race a number of times; a lost guarantee shows up as zero or
    // two winners in some round.
    for _ in 0..50 {
        let mgr = Arc::new(PlanLifecycleManager::new(TokenIssuer::generate()));
        let plan = seed_plan(&mgr);
        let token = plan.approval.token.clone();

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let mgr = Arc::clone(&mgr);
            let barrier = Arc::clone(&barrier);
            let token = token.clone();
            let plan_id = plan.id;
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                mgr.begin_execution(plan_id, &token)
            }));
        }

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        let losers = outcomes
            .iter()
            .filter(|r| matches!(r, Err(PlanError::AlreadyExecuting(_))))
            .count();

        assert_eq!(winners, 1, "exactly one caller may enter executing");
        assert_eq!(losers, 1, "the loser must see AlreadyExecuting");

        let fetched = mgr.get_plan(plan.id, None).unwrap();
        assert_eq!(fetched.status, PlanStatus::Executing);
    }
}

#[test]
fn token_does_not_validate_after_execution_started() {
    let mgr = PlanLifecycleManager::new(TokenIssuer::generate());
    let plan = seed_plan(&mgr);

    mgr.begin_execution(plan.id, &plan.approval.token).unwrap();
    mgr.finalize(plan.id, ExecutionOutcome::Failed).unwrap();

    // replaying the original, still-unexpired token cannot re-execute
    let err = mgr
        .begin_execution(plan.id, &plan.approval.token)
        .unwrap_err();
    assert!(matches!(err, PlanError::InvalidStateTransition { .. }));
}
