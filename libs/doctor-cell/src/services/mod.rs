pub mod availability;
pub mod store;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    BlockedTimeSlot, BookedInterval, CreateBlockedSlotRequest, DayAvailability, DoctorError,
    DoctorSchedulingConfig, UpsertDayAvailabilityRequest,
};

pub use availability::{compute_slots, AvailabilityService};
pub use store::{InMemoryScheduleStore, SupabaseScheduleStore};

/// Persistence for the doctor-owned schedule records.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_day_availability(&self, doctor_id: Uuid) -> Result<Vec<DayAvailability>, DoctorError>;

    async fn get_day_availability(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Option<DayAvailability>, DoctorError>;

    async fn upsert_day_availability(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
        request: UpsertDayAvailabilityRequest,
    ) -> Result<DayAvailability, DoctorError>;

    async fn list_blocked_slots(&self, doctor_id: Uuid, date: Option<NaiveDate>) -> Result<Vec<BlockedTimeSlot>, DoctorError>;

    async fn create_blocked_slot(&self, doctor_id: Uuid, request: CreateBlockedSlotRequest) -> Result<BlockedTimeSlot, DoctorError>;

    async fn delete_blocked_slot(&self, doctor_id: Uuid, slot_id: Uuid) -> Result<(), DoctorError>;

    async fn get_scheduling_config(&self, doctor_id: Uuid) -> Result<DoctorSchedulingConfig, DoctorError>;

    async fn set_scheduling_config(&self, doctor_id: Uuid, duration_minutes: i32) -> Result<DoctorSchedulingConfig, DoctorError>;
}

/// Read access to taken calendar time, supplied by whoever owns appointments.
#[async_trait]
pub trait BookingLookup: Send + Sync {
    /// CONFIRMED appointments and outstanding reschedule offers whose start
    /// falls in `booking_search_range(date)`.
    async fn booked_intervals(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<BookedInterval>, DoctorError>;
}
