use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::Principal;

use crate::models::{
    day_of_week_index, time_format, BlockedTimeSlot, BookedInterval, CreateBlockedSlotRequest,
    DayAvailability, DoctorError, DoctorSchedulingConfig, TimeSlot, UpsertDayAvailabilityRequest,
    MAX_APPOINTMENT_DURATION_MINUTES, MIN_APPOINTMENT_DURATION_MINUTES,
};
use crate::services::{BookingLookup, ScheduleStore};

fn overlaps(start: DateTime<Utc>, end: DateTime<Utc>, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
    start < other_end && other_start < end
}

fn validate_duration(duration_minutes: i32) -> Result<(), DoctorError> {
    if (MIN_APPOINTMENT_DURATION_MINUTES..=MAX_APPOINTMENT_DURATION_MINUTES).contains(&duration_minutes) {
        Ok(())
    } else {
        Err(DoctorError::ValidationError(format!(
            "Appointment duration must be between {} and {} minutes",
            MIN_APPOINTMENT_DURATION_MINUTES, MAX_APPOINTMENT_DURATION_MINUTES
        )))
    }
}

pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, DoctorError> {
    time_format::parse(raw)
        .ok_or_else(|| DoctorError::ValidationError(format!("Invalid time '{}', expected HH:mm", raw)))
}

/// Splits `[start, end)` on `date` into back-to-back slots of `duration_minutes`.
///
/// A trailing remainder shorter than one slot is dropped. A slot is marked
/// unavailable when it overlaps a blocked range for that date or a confirmed
/// booking. An empty or inverted window yields no slots.
pub fn compute_slots(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    duration_minutes: i32,
    bookings: &[BookedInterval],
    blocks: &[BlockedTimeSlot],
) -> Result<Vec<TimeSlot>, DoctorError> {
    if duration_minutes <= 0 {
        return Err(DoctorError::ValidationError("Slot duration must be positive".to_string()));
    }
    if start >= end {
        return Ok(Vec::new());
    }

    let blocked: Vec<(DateTime<Utc>, DateTime<Utc>)> = blocks
        .iter()
        .filter_map(|block| block.range_on(date))
        .collect();

    let step = Duration::minutes(duration_minutes as i64);
    let window_end = date.and_time(end).and_utc();
    let mut current_time = date.and_time(start).and_utc();
    let mut slots = Vec::new();

    // Dates at the edge of chrono's range end the sequence instead of overflowing
    while let Some(slot_end) = current_time.checked_add_signed(step) {
        if slot_end > window_end {
            break;
        }

        let is_blocked = blocked
            .iter()
            .any(|(block_start, block_end)| overlaps(current_time, slot_end, *block_start, *block_end));
        let is_booked = bookings
            .iter()
            .any(|booking| overlaps(current_time, slot_end, booking.start, booking.end));

        slots.push(TimeSlot {
            start_time: current_time,
            end_time: slot_end,
            available: !is_blocked && !is_booked,
        });

        current_time = slot_end;
    }

    Ok(slots)
}

#[derive(Clone)]
pub struct AvailabilityService {
    store: Arc<dyn ScheduleStore>,
    bookings: Arc<dyn BookingLookup>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn ScheduleStore>, bookings: Arc<dyn BookingLookup>) -> Self {
        Self { store, bookings }
    }

    /// Slots for an explicit `HH:mm` window on `date`.
    pub async fn compute_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: &str,
        end_time: &str,
        duration_minutes: i32,
    ) -> Result<Vec<TimeSlot>, DoctorError> {
        validate_duration(duration_minutes)?;
        let start = parse_hhmm(start_time)?;
        let end = parse_hhmm(end_time)?;
        self.slots_for_window(doctor_id, date, start, end, duration_minutes).await
    }

    async fn slots_for_window(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        duration_minutes: i32,
    ) -> Result<Vec<TimeSlot>, DoctorError> {
        if duration_minutes <= 0 {
            return Err(DoctorError::ValidationError("Slot duration must be positive".to_string()));
        }

        let bookings = self.bookings.booked_intervals(doctor_id, date).await?;
        let blocks = self.store.list_blocked_slots(doctor_id, Some(date)).await?;

        debug!(
            "Computing slots for doctor {} on {} with {} bookings and {} blocks",
            doctor_id, date, bookings.len(), blocks.len()
        );

        compute_slots(date, start, end, duration_minutes, &bookings, &blocks)
    }

    /// Slots for the doctor's configured weekday window and appointment duration.
    pub async fn available_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, DoctorError> {
        let day = day_of_week_index(date);
        let window = match self.store.get_day_availability(doctor_id, day).await? {
            Some(window) if window.is_enabled => window,
            _ => {
                debug!("Doctor {} has no working window on day {}", doctor_id, day);
                return Ok(Vec::new());
            }
        };

        let config = self.store.get_scheduling_config(doctor_id).await?;
        self.slots_for_window(doctor_id, date, window.start_time, window.end_time, config.appointment_duration_minutes)
            .await
    }

    /// True when `start` is exactly the start of an available slot.
    pub async fn is_bookable(&self, doctor_id: Uuid, start: DateTime<Utc>) -> Result<bool, DoctorError> {
        let slots = self.available_slots(doctor_id, start.date_naive()).await?;
        Ok(slots.iter().any(|slot| slot.available && slot.start_time == start))
    }

    pub async fn appointment_duration(&self, doctor_id: Uuid) -> Result<i32, DoctorError> {
        Ok(self.store.get_scheduling_config(doctor_id).await?.appointment_duration_minutes)
    }

    // ==========================================================================
    // SCHEDULE MANAGEMENT (DOCTOR ONLY)
    // ==========================================================================

    fn ensure_schedule_owner(actor: &Principal, doctor_id: Uuid) -> Result<(), DoctorError> {
        if actor.is_admin() || (actor.is_provider() && actor.id == doctor_id) {
            Ok(())
        } else {
            Err(DoctorError::Forbidden)
        }
    }

    pub async fn list_day_availability(&self, actor: &Principal, doctor_id: Uuid) -> Result<Vec<DayAvailability>, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;
        self.store.list_day_availability(doctor_id).await
    }

    pub async fn set_day_availability(
        &self,
        actor: &Principal,
        doctor_id: Uuid,
        day_of_week: i32,
        request: UpsertDayAvailabilityRequest,
    ) -> Result<DayAvailability, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;

        if !(0..=6).contains(&day_of_week) {
            return Err(DoctorError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if request.is_enabled && request.start_time >= request.end_time {
            return Err(DoctorError::ValidationError("Start time must be before end time".to_string()));
        }

        let saved = self.store.upsert_day_availability(doctor_id, day_of_week, request).await?;
        info!("Doctor {} updated availability for day {}", doctor_id, day_of_week);
        Ok(saved)
    }

    pub async fn list_blocked_slots(
        &self,
        actor: &Principal,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<BlockedTimeSlot>, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;
        self.store.list_blocked_slots(doctor_id, date).await
    }

    pub async fn block_time(
        &self,
        actor: &Principal,
        doctor_id: Uuid,
        request: CreateBlockedSlotRequest,
    ) -> Result<BlockedTimeSlot, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;

        if request.start_time >= request.end_time {
            return Err(DoctorError::ValidationError("Start time must be before end time".to_string()));
        }

        let block = self.store.create_blocked_slot(doctor_id, request).await?;
        info!("Doctor {} blocked {} {}-{}", doctor_id, block.blocked_date, block.start_time, block.end_time);
        Ok(block)
    }

    pub async fn unblock_time(&self, actor: &Principal, doctor_id: Uuid, slot_id: Uuid) -> Result<(), DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;
        self.store.delete_blocked_slot(doctor_id, slot_id).await
    }

    pub async fn scheduling_config(&self, actor: &Principal, doctor_id: Uuid) -> Result<DoctorSchedulingConfig, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;
        self.store.get_scheduling_config(doctor_id).await
    }

    pub async fn set_appointment_duration(
        &self,
        actor: &Principal,
        doctor_id: Uuid,
        duration_minutes: i32,
    ) -> Result<DoctorSchedulingConfig, DoctorError> {
        Self::ensure_schedule_owner(actor, doctor_id)?;
        validate_duration(duration_minutes)?;

        self.store.set_scheduling_config(doctor_id, duration_minutes).await
    }
}
