use proptest::prelude::*;
use rollout_core::model::PlanStatus;
use rollout_core::state_machine::{allowed_transitions, validate_transition};

#[test]
fn test_pending_transitions() {
    assert!(validate_transition(PlanStatus::Pending, PlanStatus::Approved).is_ok());
    assert!(validate_transition(PlanStatus::Pending, PlanStatus::Executing).is_ok());
    assert!(validate_transition(PlanStatus::Pending, PlanStatus::Cancelled).is_ok());

    // Invalid
    assert!(validate_transition(PlanStatus::Pending, PlanStatus::Completed).is_err());
    assert!(validate_transition(PlanStatus::Pending, PlanStatus::Failed).is_err());
}

#[test]
fn test_approved_transitions() {
    assert!(validate_transition(PlanStatus::Approved, PlanStatus::Executing).is_ok());
    assert!(validate_transition(PlanStatus::Approved, PlanStatus::Cancelled).is_ok());

    assert!(validate_transition(PlanStatus::Approved, PlanStatus::Pending).is_err());
    assert!(validate_transition(PlanStatus::Approved, PlanStatus::Completed).is_err());
}

#[test]
fn test_executing_transitions() {
    assert!(validate_transition(PlanStatus::Executing, PlanStatus::Completed).is_ok());
    assert!(validate_transition(PlanStatus::Executing, PlanStatus::Failed).is_ok());

    // An executing plan must finish or fail before anything else happens
    assert!(validate_transition(PlanStatus::Executing, PlanStatus::Cancelled).is_err());
}

#[test]
fn test_terminal_states_admit_nothing() {
    for terminal in [
        PlanStatus::Completed,
        PlanStatus::Failed,
        PlanStatus::Cancelled,
    ] {
        assert!(allowed_transitions(terminal).is_empty());
        for to in [
            PlanStatus::Pending,
            PlanStatus::Approved,
            PlanStatus::Executing,
            PlanStatus::Completed,
            PlanStatus::Failed,
            PlanStatus::Cancelled,
        ] {
            assert!(validate_transition(terminal, to).is_err());
        }
    }
}

fn any_status() -> impl Strategy<Value = PlanStatus> {
    prop_oneof![
        Just(PlanStatus::Pending),
        Just(PlanStatus::Approved),
        Just(PlanStatus::Executing),
        Just(PlanStatus::Completed),
        Just(PlanStatus::Failed),
        Just(PlanStatus::Cancelled),
    ]
}

proptest! {
    #[test]
    fn prop_validate_agrees_with_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_terminal_statuses_have_no_exits(from in any_status()) {
        if from.is_terminal() {
            prop_assert!(allowed_transitions(from).is_empty());
        }
    }
}
