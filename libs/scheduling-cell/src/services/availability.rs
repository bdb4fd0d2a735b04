// libs/scheduling-cell/src/services/availability.rs
use anyhow::Result;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{ApiFailure, SupabaseClient};

use crate::models::{AvailabilityWindow, AvailabilityWindowSpec, SchedulingError};

pub struct AvailabilityService {
    supabase: SupabaseClient,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// List a provider's recurring windows. Ordering is by day-of-week then
    /// start time for stable presentation; correctness does not depend on it.
    pub async fn list_windows(
        &self,
        provider_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, SchedulingError> {
        debug!("Fetching availability windows for provider: {}", provider_id);

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

    /// Replace a provider's entire availability set in one transaction:
    /// either every old row is gone and every new row is present, or the
    /// prior set remains fully intact. Idempotent for identical input.
    ///
    /// Validation mirrors exactly what the schema enforces. Overlapping or
    /// duplicate windows are accepted as-is; the slot deriver deduplicates
    /// the candidates they produce.
    pub async fn replace_all(
        &self,
        provider_id: Uuid,
        windows: Vec<AvailabilityWindowSpec>,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailabilityWindow>, SchedulingError> {
        info!("Replacing availability for provider {} with {} windows", provider_id, windows.len());

        for window in &windows {
            Self::validate_window(window)?;
        }

        let payload: Vec<Value> = windows
            .iter()
            .map(|w| {
                json!({
                    "day_of_week": w.day_of_week,
                    "start_time": w.start_time.format("%H:%M:%S").to_string(),
                    "end_time": w.end_time.format("%H:%M:%S").to_string(),
                    "slot_duration_minutes": w.slot_duration_minutes,
                })
            })
            .collect();

        let result: Vec<Value> = self
            .supabase
            .rpc(
                "replace_provider_availability",
                auth_token,
                json!({
                    "p_provider_id": provider_id,
                    "p_windows": payload,
                }),
            )
            .await
            .map_err(map_api_failure("provider"))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<AvailabilityWindow>, _>>()
            .map_err(|e| SchedulingError::Database(format!("Failed to parse windows: {}", e)))
    }

    fn validate_window(window: &AvailabilityWindowSpec) -> Result<(), SchedulingError> {
        if !(1..=7).contains(&window.day_of_week) {
            return Err(SchedulingError::Validation(
                "Day of week must be between 1 (Monday) and 7 (Sunday)".to_string(),
            ));
        }
        if window.start_time >= window.end_time {
            return Err(SchedulingError::Validation(
                "Window start time must be before end time".to_string(),
            ));
        }
        if window.slot_duration_minutes <= 0 {
            return Err(SchedulingError::Validation(
                "Slot duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// PostgREST surfaces our SQL functions' failures as status codes: a plain
/// raise (errcode P0001) becomes 400, P0002 (no_data_found) becomes 404, an
/// exclusion-style 23P01 becomes 409. Map those onto the scheduling
/// taxonomy; everything else is a storage failure.
pub(crate) fn map_api_failure(entity: &'static str) -> impl Fn(anyhow::Error) -> SchedulingError {
    move |err| match err.downcast_ref::<ApiFailure>() {
        Some(failure) if failure.status == 400 => {
            SchedulingError::Validation(postgrest_message(&failure.body))
        }
        Some(failure) if failure.status == 404 => SchedulingError::NotFound(entity),
        Some(failure) if failure.status == 409 => SchedulingError::Conflict,
        _ => SchedulingError::Database(err.to_string()),
    }
}

fn postgrest_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
