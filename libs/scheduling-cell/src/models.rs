// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

/// A recurring weekly interval during which a provider accepts bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// ISO day of week: 1 = Monday .. 7 = Sunday.
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub created_at: DateTime<Utc>,
}

/// A scheduled encounter between a patient and a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    Cancelled,
    Completed,
}

impl AppointmentStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }

    /// Whether an appointment in this status consumes its slot. Cancelled
    /// appointments free the interval; every other status keeps it blocked.
    pub fn blocks_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A bookable sub-interval derived from an availability window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Client-submitted window used in whole-set replacement. The server stamps
/// identity and provider ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindowSpec {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub windows: Vec<AvailabilityWindowSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub reason: String,
    pub notes: Option<String>,
}

/// Partial update: unset fields are left unchanged. Status is not updatable
/// here; status changes go through the dedicated transition endpoint.
///
/// An absent field and an explicit JSON null both deserialize to `None`, so
/// notes cannot be cleared through this request, only overwritten. Clients
/// that want an empty note send an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.duration_minutes.is_none()
            && self.reason.is_none()
            && self.notes.is_none()
    }

    pub fn moves_interval(&self) -> bool {
        self.start_time.is_some() || self.duration_minutes.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Requested interval conflicts with an existing appointment")]
    Conflict,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match &err {
            SchedulingError::NotFound(_) => AppError::NotFound(err.to_string()),
            SchedulingError::Validation(_) => AppError::ValidationError(err.to_string()),
            SchedulingError::Conflict => AppError::Conflict(err.to_string()),
            SchedulingError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            SchedulingError::Database(_) => AppError::Database(err.to_string()),
        }
    }
}
