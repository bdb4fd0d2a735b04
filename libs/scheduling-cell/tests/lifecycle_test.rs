use assert_matches::assert_matches;
use chrono::{Duration, Utc};

use scheduling_cell::models::{AppointmentStatus, SchedulingError};
use scheduling_cell::services::lifecycle::AppointmentLifecycleService;

use AppointmentStatus::{Cancelled, Completed, Confirmed, Requested};

const ALL_STATUSES: [AppointmentStatus; 4] = [Requested, Confirmed, Cancelled, Completed];

fn allowed(from: AppointmentStatus, to: AppointmentStatus) -> bool {
    matches!(
        (from, to),
        (Requested, Confirmed)
            | (Requested, Cancelled)
            | (Confirmed, Cancelled)
            | (Confirmed, Completed)
    )
}

#[test]
fn transition_table_is_total_and_strict() {
    let lifecycle = AppointmentLifecycleService::new();

    for from in ALL_STATUSES {
        for to in ALL_STATUSES {
            let result = lifecycle.validate_status_transition(from, to);
            if allowed(from, to) {
                assert!(result.is_ok(), "{} -> {} should be allowed", from, to);
            } else {
                assert_matches!(
                    result,
                    Err(SchedulingError::InvalidTransition { .. }),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
            }
        }
    }
}

#[test]
fn terminal_states_admit_no_transitions() {
    let lifecycle = AppointmentLifecycleService::new();

    assert!(lifecycle.valid_transitions(Cancelled).is_empty());
    assert!(lifecycle.valid_transitions(Completed).is_empty());
    assert!(Cancelled.is_terminal());
    assert!(Completed.is_terminal());
    assert!(!Requested.is_terminal());
    assert!(!Confirmed.is_terminal());
}

#[test]
fn only_cancelled_frees_its_slot() {
    assert!(!Cancelled.blocks_slot());
    assert!(Requested.blocks_slot());
    assert!(Confirmed.blocks_slot());
    assert!(Completed.blocks_slot());
}

#[test]
fn early_completion_is_flagged_not_rejected() {
    let lifecycle = AppointmentLifecycleService::new();
    let now = Utc::now();

    assert!(lifecycle.completes_ahead_of_schedule(now + Duration::hours(1), now));
    assert!(!lifecycle.completes_ahead_of_schedule(now - Duration::hours(1), now));

    // The transition itself is still valid either way.
    assert!(lifecycle
        .validate_status_transition(Confirmed, Completed)
        .is_ok());
}
