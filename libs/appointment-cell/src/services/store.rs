use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use doctor_cell::models::{booking_search_range, BookedInterval, DoctorError};
use doctor_cell::services::BookingLookup;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

const APPOINTMENTS_PATH: &str = "/rest/v1/appointments";

/// Persistence for appointments. Every mutation goes through
/// `update_if_version`, which writes only when the stored version still
/// matches the one that was read.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Persists `appointment` if the stored row is still at `appointment.version`.
    /// The returned row carries `version + 1`.
    async fn update_if_version(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError>;

    async fn list_for_patient(&self, patient_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_doctor(&self, doctor_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError>;

    /// Appointments of `doctor_id` holding time that starts in `[from, to)`:
    /// CONFIRMED ones by scheduled time and RESCHEDULED ones by offered time.
    async fn booked_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// CONFIRMED appointments starting in `[from, to]` that have not been reminded.
    async fn reminder_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError>;

    /// Flips `reminder_24h_sent` to true. Returns false when it was already set.
    async fn mark_reminder_sent(&self, appointment_id: Uuid) -> Result<bool, AppointmentError>;
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn status_filter(status: Option<AppointmentStatus>) -> String {
    status.map(|s| format!("&status=eq.{}", s)).unwrap_or_default()
}

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn db_error(e: anyhow::Error) -> AppointmentError {
        error!("Appointment store request failed: {}", e);
        AppointmentError::DatabaseError(e.to_string())
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, AppointmentError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn query(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(Self::db_error)?;
        Self::parse_rows(rows)
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_PATH, appointment_id);
        self.query(&path).await?
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        debug!("Inserting appointment {} for doctor {}", appointment.id, appointment.doctor_id);

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            APPOINTMENTS_PATH,
            None,
            Some(json!(appointment)),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(Self::db_error)?;

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no rows".to_string()))
    }

    async fn update_if_version(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "{}?id=eq.{}&version=eq.{}",
            APPOINTMENTS_PATH, appointment.id, appointment.version
        );

        let body = json!({
            "status": appointment.status,
            "appointment_date": appointment.appointment_date,
            "notes": appointment.notes,
            "proposed_date": appointment.proposed_date,
            "is_call_active": appointment.is_call_active,
            "version": appointment.version + 1,
            "updated_at": Utc::now(),
        });

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(Self::db_error)?;

        match Self::parse_rows(rows)?.into_iter().next() {
            Some(updated) => Ok(updated),
            None => {
                // Either the row is gone or someone else bumped the version
                self.get(appointment.id).await?;
                Err(AppointmentError::Conflict)
            }
        }
    }

    async fn list_for_patient(&self, patient_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?patient_id=eq.{}{}&order=appointment_date.asc",
            APPOINTMENTS_PATH, patient_id, status_filter(status)
        );
        self.query(&path).await
    }

    async fn list_for_doctor(&self, doctor_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?doctor_id=eq.{}{}&order=appointment_date.asc",
            APPOINTMENTS_PATH, doctor_id, status_filter(status)
        );
        self.query(&path).await
    }

    async fn booked_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let confirmed = format!(
            "{}?doctor_id=eq.{}&status=eq.confirmed&appointment_date=gte.{}&appointment_date=lt.{}",
            APPOINTMENTS_PATH, doctor_id, timestamp(from), timestamp(to)
        );
        let offered = format!(
            "{}?doctor_id=eq.{}&status=eq.rescheduled&proposed_date=gte.{}&proposed_date=lt.{}",
            APPOINTMENTS_PATH, doctor_id, timestamp(from), timestamp(to)
        );

        let mut booked = self.query(&confirmed).await?;
        booked.extend(self.query(&offered).await?);
        Ok(booked)
    }

    async fn reminder_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?status=eq.confirmed&reminder_24h_sent=eq.false&appointment_date=gte.{}&appointment_date=lte.{}&order=appointment_date.asc",
            APPOINTMENTS_PATH, timestamp(from), timestamp(to)
        );
        self.query(&path).await
    }

    async fn mark_reminder_sent(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!(
            "{}?id=eq.{}&reminder_24h_sent=eq.false",
            APPOINTMENTS_PATH, appointment_id
        );

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(json!({ "reminder_24h_sent": true })),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(Self::db_error)?;

        Ok(!rows.is_empty())
    }
}

/// Process-local appointment store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(
        appointments: &HashMap<Uuid, Appointment>,
        predicate: impl Fn(&Appointment) -> bool,
    ) -> Vec<Appointment> {
        let mut matching: Vec<Appointment> = appointments.values().filter(|a| predicate(a)).cloned().collect();
        matching.sort_by_key(|a| a.appointment_date);
        matching
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments.read().await
            .get(&appointment_id)
            .cloned()
            .ok_or(AppointmentError::NotFound)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        self.appointments.write().await.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_if_version(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments.get_mut(&appointment.id).ok_or(AppointmentError::NotFound)?;

        if stored.version != appointment.version {
            return Err(AppointmentError::Conflict);
        }

        let mut updated = appointment.clone();
        updated.version += 1;
        updated.updated_at = Utc::now();
        // The reminder flag only moves through mark_reminder_sent
        updated.reminder_24h_sent = stored.reminder_24h_sent;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list_for_patient(&self, patient_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::filtered(&appointments, |a| {
            a.patient_id == patient_id && status.map_or(true, |s| a.status == s)
        }))
    }

    async fn list_for_doctor(&self, doctor_id: Uuid, status: Option<AppointmentStatus>) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::filtered(&appointments, |a| {
            a.doctor_id == doctor_id && status.map_or(true, |s| a.status == s)
        }))
    }

    async fn booked_for_doctor(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::filtered(&appointments, |a| {
            let held_from = match a.status {
                AppointmentStatus::Confirmed => Some(a.appointment_date),
                AppointmentStatus::Rescheduled => a.proposed_date,
                _ => None,
            };
            a.doctor_id == doctor_id && held_from.map_or(false, |start| start >= from && start < to)
        }))
    }

    async fn reminder_candidates(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(Self::filtered(&appointments, |a| {
            a.status == AppointmentStatus::Confirmed
                && !a.reminder_24h_sent
                && a.appointment_date >= from
                && a.appointment_date <= to
        }))
    }

    async fn mark_reminder_sent(&self, appointment_id: Uuid) -> Result<bool, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let stored = appointments.get_mut(&appointment_id).ok_or(AppointmentError::NotFound)?;

        if stored.reminder_24h_sent {
            return Ok(false);
        }
        stored.reminder_24h_sent = true;
        Ok(true)
    }
}

#[async_trait]
impl BookingLookup for InMemoryAppointmentStore {
    async fn booked_intervals(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<BookedInterval>, DoctorError> {
        let (from, to) = booking_search_range(date)?;

        let booked = self.booked_for_doctor(doctor_id, from, to)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        Ok(booked.iter().map(Appointment::held_interval).collect())
    }
}
