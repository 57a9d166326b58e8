use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use shared_models::error::AppError;

pub const DEFAULT_APPOINTMENT_DURATION_MINUTES: i32 = 30;
pub const MIN_APPOINTMENT_DURATION_MINUTES: i32 = 5;
pub const MAX_APPOINTMENT_DURATION_MINUTES: i32 = 240;

/// `HH:mm` at the API boundary. Postgres `time` columns come back as
/// `HH:mm:ss`, so both are accepted on input.
pub mod time_format {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}', expected HH:mm", raw)))
    }
}

/// 0 = Sunday … 6 = Saturday, matching the `day_of_week` column.
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

// ==============================================================================
// SCHEDULE MODELS
// ==============================================================================

/// Weekly recurring working window, at most one per doctor and weekday.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub is_enabled: bool,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Date-specific exception carved out of the weekly window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockedTimeSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub blocked_date: NaiveDate,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlockedTimeSlot {
    pub fn range_on(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.blocked_date != date || self.start_time >= self.end_time {
            return None;
        }
        Some((
            date.and_time(self.start_time).and_utc(),
            date.and_time(self.end_time).and_utc(),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSchedulingConfig {
    pub doctor_id: Uuid,
    pub appointment_duration_minutes: i32,
}

impl DoctorSchedulingConfig {
    pub fn default_for(doctor_id: Uuid) -> Self {
        Self {
            doctor_id,
            appointment_duration_minutes: DEFAULT_APPOINTMENT_DURATION_MINUTES,
        }
    }
}

/// Start times whose bookings can reach into `date`: the day itself plus the
/// longest appointment's worth of the previous evening.
pub fn booking_search_range(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), DoctorError> {
    let out_of_range = || DoctorError::ValidationError(format!("Date {} is out of range", date));

    let day_start = date.and_hms_opt(0, 0, 0).ok_or_else(out_of_range)?.and_utc();
    let from = day_start
        .checked_sub_signed(chrono::Duration::minutes(MAX_APPOINTMENT_DURATION_MINUTES as i64))
        .ok_or_else(out_of_range)?;
    let to = day_start
        .checked_add_signed(chrono::Duration::days(1))
        .ok_or_else(out_of_range)?;

    Ok((from, to))
}

/// Time on a doctor's calendar that is taken, either by a CONFIRMED
/// appointment or by an outstanding reschedule offer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BookedInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookedInterval {
    pub fn new(start: DateTime<Utc>, duration_minutes: i32) -> Self {
        Self {
            start,
            end: start + chrono::Duration::minutes(duration_minutes as i64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub available: bool,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertDayAvailabilityRequest {
    pub is_enabled: bool,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlockedSlotRequest {
    pub blocked_date: NaiveDate,
    #[serde(with = "time_format")]
    pub start_time: NaiveTime,
    #[serde(with = "time_format")]
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSchedulingConfigRequest {
    pub appointment_duration_minutes: i32,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DoctorError {
    #[error("Doctor schedule entry not found")]
    NotFound,

    #[error("Only the doctor can manage this schedule")]
    Forbidden,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound => AppError::NotFound(err.to_string()),
            DoctorError::Forbidden => AppError::Forbidden(err.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_format_accepts_minutes_and_seconds() {
        assert_eq!(time_format::parse("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(time_format::parse("17:00:00"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(time_format::parse("9.30"), None);
    }

    #[test]
    fn day_index_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        assert_eq!(day_of_week_index(sunday), 0);
        assert_eq!(day_of_week_index(saturday), 6);
    }

    #[test]
    fn blocked_slot_range_only_applies_to_its_date() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let block = BlockedTimeSlot {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            blocked_date: date,
            start_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            reason: None,
            created_at: Utc::now(),
        };

        assert!(block.range_on(date).is_some());
        assert!(block.range_on(date.succ_opt().unwrap()).is_none());
    }

    #[test]
    fn booking_search_range_reaches_into_the_previous_evening() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        let (from, to) = booking_search_range(date).unwrap();

        assert_eq!(from, Utc.with_ymd_and_hms(2025, 6, 15, 20, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 6, 17, 0, 0, 0).unwrap());

        assert!(matches!(booking_search_range(NaiveDate::MAX), Err(DoctorError::ValidationError(_))));
        assert!(matches!(booking_search_range(NaiveDate::MIN), Err(DoctorError::ValidationError(_))));
    }
}
