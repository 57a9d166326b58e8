use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

use doctor_cell::models::BookedInterval;
use shared_models::error::AppError;

pub const DEFAULT_DURATION_MINUTES: i32 = 30;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub duration_minutes: i32,
    pub share_medical_records: bool,
    pub is_video_call: bool,
    pub is_call_active: bool,
    pub reminder_24h_sent: bool,
    pub proposed_date: Option<DateTime<Utc>>,
    pub follow_up_of: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Calculate the scheduled end time based on appointment_date and duration
    pub fn interval(&self) -> BookedInterval {
        BookedInterval::new(self.appointment_date, self.duration_minutes)
    }

    /// Calendar time kept from other bookings: the offered time while a
    /// reschedule is outstanding, the scheduled time otherwise.
    pub fn held_interval(&self) -> BookedInterval {
        match (self.status, self.proposed_date) {
            (AppointmentStatus::Rescheduled, Some(proposed)) => BookedInterval::new(proposed, self.duration_minutes),
            _ => self.interval(),
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }

    /// Builds a fresh PENDING appointment at version 1.
    pub fn new_pending(
        patient_id: Uuid,
        doctor_id: Uuid,
        appointment_date: DateTime<Utc>,
        appointment_type: AppointmentType,
        duration_minutes: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date,
            status: AppointmentStatus::Pending,
            is_video_call: appointment_type == AppointmentType::Video,
            appointment_type,
            reason: None,
            notes: None,
            duration_minutes,
            share_medical_records: false,
            is_call_active: false,
            reminder_24h_sent: false,
            proposed_date: None,
            follow_up_of: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rescheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    #[serde(alias = "in-person", alias = "office")]
    InPerson,
    #[serde(alias = "video_call", alias = "telehealth", alias = "virtual")]
    Video,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::InPerson => write!(f, "in_person"),
            AppointmentType::Video => write!(f, "video"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    /// Required when an admin books on behalf of a patient.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub reason: Option<String>,
    #[serde(default)]
    pub share_medical_records: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub note: Option<String>,
    pub new_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleResponseRequest {
    pub decision: RescheduleDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub notes: Option<String>,
    pub follow_up_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppointmentListQuery {
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub appointment: Appointment,
    pub follow_up: Option<Appointment>,
}

/// Result of one reminder pass.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReminderSweepReport {
    pub selected: usize,
    pub reminded: usize,
    pub failed: usize,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not allowed to act on this appointment")]
    Forbidden,

    #[error("Appointment slot not available")]
    SlotUnavailable,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment was modified concurrently, reload and retry")]
    Conflict,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<doctor_cell::DoctorError> for AppointmentError {
    fn from(err: doctor_cell::DoctorError) -> Self {
        match err {
            doctor_cell::DoctorError::NotFound => AppointmentError::ValidationError("Doctor schedule not found".to_string()),
            doctor_cell::DoctorError::Forbidden => AppointmentError::Forbidden,
            doctor_cell::DoctorError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            doctor_cell::DoctorError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(err.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::Forbidden => AppError::Forbidden(err.to_string()),
            AppointmentError::SlotUnavailable => AppError::Conflict(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::Conflict => AppError::Conflict(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_type_marks_booking_as_video_call() {
        let at = Utc::now();
        let video = Appointment::new_pending(Uuid::new_v4(), Uuid::new_v4(), at, AppointmentType::Video, 30);
        let office = Appointment::new_pending(Uuid::new_v4(), Uuid::new_v4(), at, AppointmentType::InPerson, 30);

        assert!(video.is_video_call);
        assert!(!office.is_video_call);
        assert_eq!(video.status, AppointmentStatus::Pending);
        assert_eq!(video.version, 1);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(AppointmentStatus::Rescheduled).unwrap(), "rescheduled");
        let parsed: AppointmentType = serde_json::from_str("\"telehealth\"").unwrap();
        assert_eq!(parsed, AppointmentType::Video);
    }

    #[test]
    fn transition_errors_map_to_conflict_responses() {
        let err: AppError = AppointmentError::InvalidTransition {
            from: AppointmentStatus::Pending,
            to: AppointmentStatus::Completed,
        }
        .into();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("pending") && msg.contains("completed")));
    }
}
