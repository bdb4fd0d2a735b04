// libs/scheduling-cell/src/services/slots.rs
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AvailabilityWindow, OpenSlot, SchedulingError};

/// Derive bookable slot start times for a provider over a closed date range.
///
/// Pure computation: windows are matched by ISO day-of-week, candidates are
/// generated at fixed `slot_duration_minutes` increments, and any candidate
/// whose half-open interval intersects a slot-blocking appointment is
/// dropped. The result is ordered by start time and deduplicated, so
/// overlapping windows never produce the same slot twice.
pub fn derive_open_slots(
    windows: &[AvailabilityWindow],
    appointments: &[Appointment],
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<OpenSlot> {
    if windows.is_empty() || from > to {
        return Vec::new();
    }

    let blocking: Vec<(DateTime<Utc>, DateTime<Utc>)> = appointments
        .iter()
        .filter(|appt| appt.status.blocks_slot())
        .map(|appt| (appt.start_time, appt.end_time()))
        .collect();

    let mut slots = Vec::new();

    let mut date = from;
    while date <= to {
        let day_of_week = date.weekday().number_from_monday() as i32;

        for window in windows.iter().filter(|w| w.day_of_week == day_of_week) {
            let duration = window.slot_duration_minutes;
            if duration <= 0 {
                continue;
            }

            let window_start = minutes_from_midnight(&window.start_time);
            let window_end = minutes_from_midnight(&window.end_time);

            let day_start = date.and_time(window.start_time).and_utc();

            // Stop once the remaining window is shorter than one slot.
            let mut offset = 0;
            while window_start + offset + duration <= window_end {
                let slot_start = day_start + Duration::minutes(offset as i64);
                let slot_end = slot_start + Duration::minutes(duration as i64);

                let blocked = blocking
                    .iter()
                    .any(|(appt_start, appt_end)| slot_start < *appt_end && slot_end > *appt_start);

                if !blocked {
                    slots.push(OpenSlot {
                        start_time: slot_start,
                        end_time: slot_end,
                        duration_minutes: duration,
                    });
                }

                offset += duration;
            }
        }

        date += Duration::days(1);
    }

    slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    slots.dedup_by_key(|slot| slot.start_time);

    slots
}

fn minutes_from_midnight(time: &chrono::NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

/// Fetches a provider's windows and slot-blocking appointments, then feeds
/// the pure deriver.
pub struct SlotService {
    supabase: SupabaseClient,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn get_open_slots(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<OpenSlot>, SchedulingError> {
        debug!("Deriving open slots for provider {} from {} to {}", provider_id, from, to);

        if from > to {
            return Ok(Vec::new());
        }

        let windows = self.get_windows(provider_id, auth_token).await?;
        if windows.is_empty() {
            return Ok(Vec::new());
        }

        let appointments = self
            .get_blocking_appointments(provider_id, from, to, auth_token)
            .await?;

        Ok(derive_open_slots(&windows, &appointments, from, to))
    }

    async fn get_windows(
        &self,
        provider_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, SchedulingError> {
        let path = format!(
            "/rest/v1/availability_windows?provider_id=eq.{}&order=day_of_week.asc,start_time.asc",
            provider_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse windows: {}", e)))
    }

    async fn get_blocking_appointments(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        let range_start = from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let range_end = (to + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();

        // end_time is a generated column, so the overlap predicate can run
        // server side: start < range_end AND end > range_start.
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&status=neq.cancelled&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            provider_id,
            urlencoding::encode(&range_end.to_rfc3339()),
            urlencoding::encode(&range_start.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Appointment>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointments: {}", e)))
    }
}
