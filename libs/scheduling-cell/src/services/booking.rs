// libs/scheduling-cell/src/services/booking.rs
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentSearchQuery, AppointmentStatus, CreateAppointmentRequest,
    SchedulingError, UpdateAppointmentRequest,
};
use crate::services::availability::map_api_failure;
use crate::services::lifecycle::AppointmentLifecycleService;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            lifecycle_service: AppointmentLifecycleService::new(),
        }
    }

    /// Book an appointment in the initial `requested` status.
    ///
    /// The overlap check and the insert run inside the `book_appointment`
    /// SQL function under a per-provider advisory transaction lock, so two
    /// concurrent requests for the same interval cannot both commit. A lost
    /// race surfaces as `Conflict` and is never retried here; the caller
    /// decides whether to re-derive slots.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        info!(
            "Booking appointment for patient {} with provider {} at {}",
            request.patient_id, request.provider_id, request.start_time
        );

        if request.duration_minutes <= 0 {
            return Err(SchedulingError::Validation(
                "Appointment duration must be positive".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(SchedulingError::Validation(
                "Appointment reason is required".to_string(),
            ));
        }

        let result: Vec<Value> = self
            .supabase
            .rpc(
                "book_appointment",
                auth_token,
                json!({
                    "p_patient_id": request.patient_id,
                    "p_provider_id": request.provider_id,
                    "p_start_time": request.start_time.to_rfc3339(),
                    "p_duration_minutes": request.duration_minutes,
                    "p_reason": request.reason,
                    "p_notes": request.notes,
                }),
            )
            .await
            .map_err(map_api_failure("provider"))?;

        let appointment = parse_single(result, "Booking returned no row")?;

        info!("Appointment {} booked with provider {}", appointment.id, appointment.provider_id);
        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        if result.is_empty() {
            return Err(SchedulingError::NotFound("appointment"));
        }

        serde_json::from_value(result[0].clone())
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
    }

    /// Search appointments with filters.
    pub async fn search_appointments(
        &self,
        query: AppointmentSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        debug!("Searching appointments with filters: {:?}", query);

        let mut query_parts = Vec::new();

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(provider_id) = query.provider_id {
            query_parts.push(format!("provider_id=eq.{}", provider_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            let encoded = urlencoding::encode(&from_date.to_rfc3339()).into_owned();
            query_parts.push(format!("start_time=gte.{}", encoded));
        }
        if let Some(to_date) = query.to_date {
            let encoded = urlencoding::encode(&to_date.to_rfc3339()).into_owned();
            query_parts.push(format!("start_time=lte.{}", encoded));
        }
        if let Some(limit) = query.limit {
            query_parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset));
        }
        query_parts.push("order=start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

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

    /// Partial update of a non-terminal appointment: unset fields stay
    /// unchanged. When the interval moves, the `update_appointment` SQL
    /// function re-runs the overlap check excluding the appointment's own
    /// prior interval, in the same transaction as the write. The terminal
    /// check below is a fast path only; the function re-checks the status
    /// inside the transaction, so a transition landing between the read
    /// here and the call cannot slip a write onto a closed appointment.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Updating appointment: {}", appointment_id);

        if request.is_empty() {
            return Err(SchedulingError::Validation(
                "Update contains no fields".to_string(),
            ));
        }
        if let Some(duration) = request.duration_minutes {
            if duration <= 0 {
                return Err(SchedulingError::Validation(
                    "Appointment duration must be positive".to_string(),
                ));
            }
        }
        if let Some(reason) = &request.reason {
            if reason.trim().is_empty() {
                return Err(SchedulingError::Validation(
                    "Appointment reason cannot be empty".to_string(),
                ));
            }
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        if current.status.is_terminal() {
            return Err(SchedulingError::Validation(format!(
                "Appointment in terminal status {} cannot be modified",
                current.status
            )));
        }

        let result: Vec<Value> = self
            .supabase
            .rpc(
                "update_appointment",
                auth_token,
                json!({
                    "p_id": appointment_id,
                    "p_start_time": request.start_time.map(|t| t.to_rfc3339()),
                    "p_duration_minutes": request.duration_minutes,
                    "p_reason": request.reason,
                    "p_notes": request.notes,
                }),
            )
            .await
            .map_err(map_api_failure("appointment"))?;

        let appointment = parse_single(result, "Update returned no row")?;

        info!("Appointment {} updated", appointment_id);
        Ok(appointment)
    }

    /// Status-only transition, validated against the lifecycle table. Does
    /// not re-run overlap checks: a status change never moves the interval.
    /// Persisted with a compare-and-swap on the previous status so a
    /// concurrent transition loses cleanly instead of being overwritten.
    pub async fn set_appointment_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: Option<&str>,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Transitioning appointment {} to {}", appointment_id, new_status);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle_service
            .validate_status_transition(current.status, new_status)?;

        if new_status == AppointmentStatus::Completed
            && self
                .lifecycle_service
                .completes_ahead_of_schedule(current.start_time, Utc::now())
        {
            warn!(
                "Appointment {} completed before its scheduled start {}",
                appointment_id, current.start_time
            );
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id, current.status
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                auth_token,
                Some(json!({
                    "status": new_status.to_string(),
                    "updated_at": Utc::now().to_rfc3339(),
                })),
                Some(headers),
            )
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        // Zero rows means the status moved underneath us.
        if result.is_empty() {
            warn!("Lost status race on appointment {}", appointment_id);
            return Err(SchedulingError::Conflict);
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone())
            .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))?;

        if appointment.status == AppointmentStatus::Completed {
            self.record_encounter_link(&appointment, auth_token);
        }

        info!("Appointment {} transitioned to {}", appointment_id, appointment.status);
        Ok(appointment)
    }

    /// Hard delete on explicit request from an authorized actor.
    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<(), SchedulingError> {
        debug!("Deleting appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, auth_token, None, Some(headers))
            .await
            .map_err(|e| SchedulingError::Database(e.to_string()))?;

        if result.is_empty() {
            return Err(SchedulingError::NotFound("appointment"));
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// A completed appointment is expected to correspond to one clinical
    /// encounter record. The write is best-effort and never blocks the
    /// status transition; the clinical-record collaborator owns consistency.
    fn record_encounter_link(&self, appointment: &Appointment, auth_token: Option<&str>) {
        let supabase = Arc::clone(&self.supabase);
        let token = auth_token.map(|t| t.to_string());
        let body = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "provider_id": appointment.provider_id,
            "occurred_at": appointment.start_time.to_rfc3339(),
        });
        let appointment_id = appointment.id;

        tokio::spawn(async move {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                "Prefer",
                reqwest::header::HeaderValue::from_static("return=representation"),
            );

            let result: Result<Vec<Value>> = supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/consultations",
                    token.as_deref(),
                    Some(body),
                    Some(headers),
                )
                .await;

            if let Err(e) = result {
                warn!("Failed to record encounter link for appointment {}: {}", appointment_id, e);
            }
        });
    }
}

fn parse_single(result: Vec<Value>, empty_msg: &str) -> Result<Appointment, SchedulingError> {
    let row = result
        .into_iter()
        .next()
        .ok_or_else(|| SchedulingError::Database(empty_msg.to_string()))?;

    serde_json::from_value(row)
        .map_err(|e| SchedulingError::Database(format!("Failed to parse appointment: {}", e)))
}
