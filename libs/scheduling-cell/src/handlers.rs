use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentSearchQuery, CreateAppointmentRequest, ReplaceAvailabilityRequest,
    SetAppointmentStatusRequest, UpdateAppointmentRequest,
};
use crate::services::{AppointmentBookingService, AvailabilityService, SlotService};

#[derive(Debug, Deserialize)]
pub struct OpenSlotsQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_availability(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let windows = availability_service.list_windows(provider_id, None).await?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "windows": windows,
    })))
}

#[axum::debug_handler]
pub async fn get_open_slots(
    State(state): State<Arc<AppConfig>>,
    Path(provider_id): Path<Uuid>,
    Query(query): Query<OpenSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slot_service = SlotService::new(&state);

    let slots = slot_service
        .get_open_slots(provider_id, query.from, query.to, None)
        .await?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "from": query.from,
        "to": query.to,
        "total_slots": slots.len(),
        "open_slots": slots,
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn replace_availability(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(provider_id): Path<Uuid>,
    Json(request): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Providers may only edit their own weekly template.
    match user.role.as_deref() {
        Some("admin") => {}
        Some("provider") if user.id == provider_id.to_string() => {}
        _ => {
            return Err(AppError::Auth(
                "Only the provider or an administrator can replace availability".to_string(),
            ))
        }
    }

    let availability_service = AvailabilityService::new(&state);

    let windows = availability_service
        .replace_all(provider_id, request.windows, Some(token))
        .await?;

    Ok(Json(json!({
        "provider_id": provider_id,
        "windows": windows,
    })))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .create_appointment(request, Some(token))
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service
        .search_appointments(query, Some(token))
        .await?;

    Ok(Json(json!({
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, Some(token))
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .update_appointment(appointment_id, request, Some(token))
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn set_appointment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<SetAppointmentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .set_appointment_status(appointment_id, request.status, Some(token))
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = AppointmentBookingService::new(&state);

    booking_service
        .delete_appointment(appointment_id, Some(token))
        .await?;

    Ok(Json(json!({
        "deleted": appointment_id,
    })))
}
