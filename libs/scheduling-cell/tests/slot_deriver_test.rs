use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use scheduling_cell::models::{Appointment, AppointmentStatus, AvailabilityWindow};
use scheduling_cell::services::slots::derive_open_slots;

fn window(day_of_week: i32, start: &str, end: &str, slot_minutes: i32) -> AvailabilityWindow {
    AvailabilityWindow {
        id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        day_of_week,
        start_time: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
        end_time: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        slot_duration_minutes: slot_minutes,
        created_at: Utc::now(),
    }
}

fn appointment(start: &str, duration_minutes: i32, status: AppointmentStatus) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        provider_id: Uuid::new_v4(),
        start_time: start.parse::<DateTime<Utc>>().unwrap(),
        duration_minutes,
        status,
        reason: "check-up".to_string(),
        notes: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

// 2025-03-03 is a Monday.
const MONDAY: &str = "2025-03-03";

#[test]
fn no_windows_yields_no_slots() {
    let slots = derive_open_slots(&[], &[], date(MONDAY), date("2025-03-09"));
    assert!(slots.is_empty());
}

#[test]
fn inverted_range_yields_no_slots() {
    let windows = vec![window(1, "09:00", "10:00", 30)];
    let slots = derive_open_slots(&windows, &[], date("2025-03-09"), date(MONDAY));
    assert!(slots.is_empty());
}

#[test]
fn monday_window_produces_expected_starts() {
    let windows = vec![window(1, "09:00", "10:00", 30)];

    let slots = derive_open_slots(&windows, &[], date(MONDAY), date(MONDAY));

    let starts: Vec<String> = slots.iter().map(|s| s.start_time.to_rfc3339()).collect();
    assert_eq!(
        starts,
        vec![
            "2025-03-03T09:00:00+00:00".to_string(),
            "2025-03-03T09:30:00+00:00".to_string(),
        ]
    );
}

#[test]
fn booked_interval_is_excluded_and_others_untouched() {
    let windows = vec![window(1, "09:00", "10:00", 30)];
    let booked = vec![appointment(
        "2025-03-03T09:00:00Z",
        30,
        AppointmentStatus::Requested,
    )];

    let slots = derive_open_slots(&windows, &booked, date(MONDAY), date(MONDAY));

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time.to_rfc3339(), "2025-03-03T09:30:00+00:00");
}

#[test]
fn cancelled_appointment_does_not_block() {
    let windows = vec![window(1, "09:00", "10:00", 30)];
    let cancelled = vec![appointment(
        "2025-03-03T09:00:00Z",
        30,
        AppointmentStatus::Cancelled,
    )];

    let slots = derive_open_slots(&windows, &cancelled, date(MONDAY), date(MONDAY));

    assert_eq!(slots.len(), 2);
}

#[test]
fn partial_overlap_blocks_slot() {
    let windows = vec![window(1, "09:00", "10:00", 30)];
    // 09:15-09:45 straddles both candidate slots.
    let booked = vec![appointment(
        "2025-03-03T09:15:00Z",
        30,
        AppointmentStatus::Confirmed,
    )];

    let slots = derive_open_slots(&windows, &booked, date(MONDAY), date(MONDAY));

    assert!(slots.is_empty());
}

#[test]
fn adjacent_appointment_does_not_block() {
    let windows = vec![window(1, "09:00", "10:00", 30)];
    // Half-open intervals: an appointment ending exactly at 09:00 is no conflict.
    let booked = vec![appointment(
        "2025-03-03T08:30:00Z",
        30,
        AppointmentStatus::Confirmed,
    )];

    let slots = derive_open_slots(&windows, &booked, date(MONDAY), date(MONDAY));

    assert_eq!(slots.len(), 2);
}

#[test]
fn uneven_window_stops_before_short_remainder() {
    // 50-minute window, 30-minute slots: only 09:00 fits.
    let windows = vec![window(1, "09:00", "09:50", 30)];

    let slots = derive_open_slots(&windows, &[], date(MONDAY), date(MONDAY));

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time.to_rfc3339(), "2025-03-03T09:00:00+00:00");
}

#[test]
fn overlapping_windows_deduplicate_by_start() {
    let windows = vec![
        window(1, "09:00", "10:00", 30),
        window(1, "09:00", "10:30", 30),
    ];

    let slots = derive_open_slots(&windows, &[], date(MONDAY), date(MONDAY));

    let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
    let mut deduped = starts.clone();
    deduped.dedup();
    assert_eq!(starts, deduped);
    assert_eq!(slots.len(), 3); // 09:00, 09:30, 10:00
}

#[test]
fn window_only_applies_on_its_weekday() {
    let windows = vec![window(1, "09:00", "10:00", 30)];

    // Tuesday through Sunday of the same week.
    let slots = derive_open_slots(&windows, &[], date("2025-03-04"), date("2025-03-09"));
    assert!(slots.is_empty());

    // A full week containing the Monday picks the slots up again.
    let slots = derive_open_slots(&windows, &[], date(MONDAY), date("2025-03-09"));
    assert_eq!(slots.len(), 2);
}

#[test]
fn multi_week_range_repeats_weekly_pattern() {
    let windows = vec![window(1, "09:00", "10:00", 30)];

    let slots = derive_open_slots(&windows, &[], date(MONDAY), date("2025-03-16"));

    // Two Mondays in range, two slots each.
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[2].start_time.to_rfc3339(), "2025-03-10T09:00:00+00:00");
}

#[test]
fn slots_are_ordered_by_start_time() {
    let windows = vec![
        window(1, "14:00", "15:00", 30),
        window(1, "09:00", "10:00", 30),
    ];

    let slots = derive_open_slots(&windows, &[], date(MONDAY), date(MONDAY));

    let mut sorted = slots.clone();
    sorted.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    assert_eq!(slots, sorted);
}
