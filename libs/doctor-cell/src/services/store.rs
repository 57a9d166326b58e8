use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    booking_search_range, BlockedTimeSlot, BookedInterval, CreateBlockedSlotRequest, DayAvailability, DoctorError,
    DoctorSchedulingConfig, UpsertDayAvailabilityRequest,
};
use crate::services::{BookingLookup, ScheduleStore};

const DAY_AVAILABILITY_PATH: &str = "/rest/v1/doctor_day_availability";
const BLOCKED_SLOTS_PATH: &str = "/rest/v1/doctor_blocked_slots";
const SCHEDULING_CONFIG_PATH: &str = "/rest/v1/doctor_scheduling_config";
const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

fn db_error(e: anyhow::Error) -> DoctorError {
    error!("Schedule store request failed: {}", e);
    DoctorError::DatabaseError(e.to_string())
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, DoctorError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| DoctorError::DatabaseError(format!("Malformed schedule row: {}", e)))
}

fn timestamp(value: chrono::DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Deserialize)]
struct BookingRow {
    appointment_date: chrono::DateTime<Utc>,
    proposed_date: Option<chrono::DateTime<Utc>>,
    duration_minutes: i32,
}

pub struct SupabaseScheduleStore {
    supabase: SupabaseClient,
}

impl SupabaseScheduleStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn upsert_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );
        headers
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn list_day_availability(&self, doctor_id: Uuid) -> Result<Vec<DayAvailability>, DoctorError> {
        let path = format!("{}?doctor_id=eq.{}&order=day_of_week.asc", DAY_AVAILABILITY_PATH, doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await.map_err(db_error)?;
        parse_rows(rows)
    }

    async fn get_day_availability(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Option<DayAvailability>, DoctorError> {
        let path = format!(
            "{}?doctor_id=eq.{}&day_of_week=eq.{}",
            DAY_AVAILABILITY_PATH, doctor_id, day_of_week
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await.map_err(db_error)?;
        Ok(parse_rows(rows)?.into_iter().next())
    }

    async fn upsert_day_availability(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
        request: UpsertDayAvailabilityRequest,
    ) -> Result<DayAvailability, DoctorError> {
        debug!("Upserting day {} availability for doctor {}", day_of_week, doctor_id);

        let now = Utc::now();
        let body = json!({
            "doctor_id": doctor_id,
            "day_of_week": day_of_week,
            "is_enabled": request.is_enabled,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "updated_at": now,
        });

        let path = format!("{}?on_conflict=doctor_id,day_of_week", DAY_AVAILABILITY_PATH);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            None,
            Some(body),
            Some(Self::upsert_headers()),
        ).await.map_err(db_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Upsert returned no rows".to_string()))
    }

    async fn list_blocked_slots(&self, doctor_id: Uuid, date: Option<NaiveDate>) -> Result<Vec<BlockedTimeSlot>, DoctorError> {
        let mut path = format!(
            "{}?doctor_id=eq.{}&order=blocked_date.asc,start_time.asc",
            BLOCKED_SLOTS_PATH, doctor_id
        );
        if let Some(date) = date {
            path.push_str(&format!("&blocked_date=eq.{}", date));
        }

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await.map_err(db_error)?;
        parse_rows(rows)
    }

    async fn create_blocked_slot(&self, doctor_id: Uuid, request: CreateBlockedSlotRequest) -> Result<BlockedTimeSlot, DoctorError> {
        let body = json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "blocked_date": request.blocked_date,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "reason": request.reason,
            "created_at": Utc::now(),
        });

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            BLOCKED_SLOTS_PATH,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(db_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Insert returned no rows".to_string()))
    }

    async fn delete_blocked_slot(&self, doctor_id: Uuid, slot_id: Uuid) -> Result<(), DoctorError> {
        let path = format!("{}?id=eq.{}&doctor_id=eq.{}", BLOCKED_SLOTS_PATH, slot_id, doctor_id);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            None,
            None,
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(db_error)?;

        if rows.is_empty() {
            return Err(DoctorError::NotFound);
        }
        Ok(())
    }

    async fn get_scheduling_config(&self, doctor_id: Uuid) -> Result<DoctorSchedulingConfig, DoctorError> {
        let path = format!("{}?doctor_id=eq.{}", SCHEDULING_CONFIG_PATH, doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await.map_err(db_error)?;

        Ok(parse_rows(rows)?
            .into_iter()
            .next()
            .unwrap_or_else(|| DoctorSchedulingConfig::default_for(doctor_id)))
    }

    async fn set_scheduling_config(&self, doctor_id: Uuid, duration_minutes: i32) -> Result<DoctorSchedulingConfig, DoctorError> {
        let body = json!({
            "doctor_id": doctor_id,
            "appointment_duration_minutes": duration_minutes,
        });

        let path = format!("{}?on_conflict=doctor_id", SCHEDULING_CONFIG_PATH);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            None,
            Some(body),
            Some(Self::upsert_headers()),
        ).await.map_err(db_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Upsert returned no rows".to_string()))
    }
}

#[async_trait]
impl BookingLookup for SupabaseScheduleStore {
    async fn booked_intervals(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<BookedInterval>, DoctorError> {
        let (from, to) = booking_search_range(date)?;

        let confirmed_path = format!(
            "{}?select=appointment_date,proposed_date,duration_minutes&doctor_id=eq.{}&status=eq.confirmed&appointment_date=gte.{}&appointment_date=lt.{}",
            APPOINTMENTS_PATH, doctor_id, timestamp(from), timestamp(to)
        );
        let offered_path = format!(
            "{}?select=appointment_date,proposed_date,duration_minutes&doctor_id=eq.{}&status=eq.rescheduled&proposed_date=gte.{}&proposed_date=lt.{}",
            APPOINTMENTS_PATH, doctor_id, timestamp(from), timestamp(to)
        );

        let confirmed: Vec<Value> = self.supabase.request(Method::GET, &confirmed_path, None, None).await.map_err(db_error)?;
        let offered: Vec<Value> = self.supabase.request(Method::GET, &offered_path, None, None).await.map_err(db_error)?;

        let mut intervals: Vec<BookedInterval> = parse_rows::<BookingRow>(confirmed)?
            .into_iter()
            .map(|row| BookedInterval::new(row.appointment_date, row.duration_minutes))
            .collect();
        intervals.extend(
            parse_rows::<BookingRow>(offered)?
                .into_iter()
                .filter_map(|row| row.proposed_date.map(|start| BookedInterval::new(start, row.duration_minutes))),
        );

        debug!("Doctor {} has {} booked intervals around {}", doctor_id, intervals.len(), date);
        Ok(intervals)
    }
}

/// Process-local schedule store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    days: RwLock<HashMap<(Uuid, i32), DayAvailability>>,
    blocks: RwLock<Vec<BlockedTimeSlot>>,
    configs: RwLock<HashMap<Uuid, DoctorSchedulingConfig>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list_day_availability(&self, doctor_id: Uuid) -> Result<Vec<DayAvailability>, DoctorError> {
        let mut days: Vec<DayAvailability> = self.days.read().await
            .values()
            .filter(|d| d.doctor_id == doctor_id)
            .cloned()
            .collect();
        days.sort_by_key(|d| d.day_of_week);
        Ok(days)
    }

    async fn get_day_availability(&self, doctor_id: Uuid, day_of_week: i32) -> Result<Option<DayAvailability>, DoctorError> {
        Ok(self.days.read().await.get(&(doctor_id, day_of_week)).cloned())
    }

    async fn upsert_day_availability(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
        request: UpsertDayAvailabilityRequest,
    ) -> Result<DayAvailability, DoctorError> {
        let now = Utc::now();
        let mut days = self.days.write().await;
        let entry = days.entry((doctor_id, day_of_week)).or_insert_with(|| DayAvailability {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week,
            is_enabled: request.is_enabled,
            start_time: request.start_time,
            end_time: request.end_time,
            created_at: now,
            updated_at: now,
        });

        entry.is_enabled = request.is_enabled;
        entry.start_time = request.start_time;
        entry.end_time = request.end_time;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn list_blocked_slots(&self, doctor_id: Uuid, date: Option<NaiveDate>) -> Result<Vec<BlockedTimeSlot>, DoctorError> {
        Ok(self.blocks.read().await
            .iter()
            .filter(|b| b.doctor_id == doctor_id && date.map_or(true, |d| b.blocked_date == d))
            .cloned()
            .collect())
    }

    async fn create_blocked_slot(&self, doctor_id: Uuid, request: CreateBlockedSlotRequest) -> Result<BlockedTimeSlot, DoctorError> {
        let block = BlockedTimeSlot {
            id: Uuid::new_v4(),
            doctor_id,
            blocked_date: request.blocked_date,
            start_time: request.start_time,
            end_time: request.end_time,
            reason: request.reason,
            created_at: Utc::now(),
        };
        self.blocks.write().await.push(block.clone());
        Ok(block)
    }

    async fn delete_blocked_slot(&self, doctor_id: Uuid, slot_id: Uuid) -> Result<(), DoctorError> {
        let mut blocks = self.blocks.write().await;
        let before = blocks.len();
        blocks.retain(|b| !(b.id == slot_id && b.doctor_id == doctor_id));
        if blocks.len() == before {
            return Err(DoctorError::NotFound);
        }
        Ok(())
    }

    async fn get_scheduling_config(&self, doctor_id: Uuid) -> Result<DoctorSchedulingConfig, DoctorError> {
        Ok(self.configs.read().await
            .get(&doctor_id)
            .cloned()
            .unwrap_or_else(|| DoctorSchedulingConfig::default_for(doctor_id)))
    }

    async fn set_scheduling_config(&self, doctor_id: Uuid, duration_minutes: i32) -> Result<DoctorSchedulingConfig, DoctorError> {
        let config = DoctorSchedulingConfig {
            doctor_id,
            appointment_duration_minutes: duration_minutes,
        };
        self.configs.write().await.insert(doctor_id, config.clone());
        Ok(config)
    }
}
