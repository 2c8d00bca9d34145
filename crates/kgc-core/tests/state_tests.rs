use kgc_core::state_machine::{allowed_transitions, validate_transition};
use kgc_core::{CloneError, CloneStatus};
use proptest::prelude::*;

fn any_status() -> impl Strategy<Value = CloneStatus> {
    prop_oneof![
        Just(CloneStatus::Pending),
        Just(CloneStatus::Active),
        Just(CloneStatus::Committed),
        Just(CloneStatus::Rejected),
    ]
}

#[test]
fn test_pending_transitions() {
    assert!(validate_transition(CloneStatus::Pending, CloneStatus::Active).is_ok());
    assert!(validate_transition(CloneStatus::Pending, CloneStatus::Rejected).is_ok());

    assert!(validate_transition(CloneStatus::Pending, CloneStatus::Committed).is_err());
}

#[test]
fn test_active_transitions() {
    assert!(validate_transition(CloneStatus::Active, CloneStatus::Committed).is_ok());
    assert!(validate_transition(CloneStatus::Active, CloneStatus::Rejected).is_ok());

    assert!(validate_transition(CloneStatus::Active, CloneStatus::Pending).is_err());
}

#[test]
fn test_invalid_transition_names_both_states() {
    let err = validate_transition(CloneStatus::Rejected, CloneStatus::Active).unwrap_err();
    assert!(matches!(
        err,
        CloneError::InvalidTransition {
            from: CloneStatus::Rejected,
            to: CloneStatus::Active
        }
    ));
    assert_eq!(err.to_string(), "invalid clone transition: rejected -> active");
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_terminal_states_accept_nothing(from in any_status(), to in any_status()) {
        if from.is_terminal() {
            prop_assert!(validate_transition(from, to).is_err());
        }
    }
}
