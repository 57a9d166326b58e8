use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::{BookedInterval, MAX_APPOINTMENT_DURATION_MINUTES};
use doctor_cell::services::AvailabilityService;
use notification_cell::{NotificationService, NotificationType};
use shared_models::auth::Principal;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
    CompleteAppointmentRequest, CompletionOutcome, RescheduleDecision, UpdateStatusRequest,
};
use crate::services::lifecycle::{AppointmentLifecycleService, TransitionActor};
use crate::services::notifications::{notification_for, status_notification};
use crate::services::store::AppointmentStore;

#[derive(Clone)]
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    availability: AvailabilityService,
    notifier: Arc<dyn NotificationService>,
    lifecycle_service: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        availability: AvailabilityService,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            store,
            availability,
            notifier,
            lifecycle_service: AppointmentLifecycleService::new(),
        }
    }

    /// Book a PENDING appointment at an open slot of the doctor
    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn book_appointment(
        &self,
        principal: &Principal,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let patient_id = self.resolve_patient(principal, request.patient_id)?;

        info!("Booking appointment for patient {} with doctor {} at {}",
              patient_id, request.doctor_id, request.appointment_date);

        self.ensure_bookable(request.doctor_id, request.appointment_date).await?;
        let duration_minutes = self.availability.appointment_duration(request.doctor_id).await?;

        let mut appointment = Appointment::new_pending(
            patient_id,
            request.doctor_id,
            request.appointment_date,
            request.appointment_type,
            duration_minutes,
        );
        appointment.reason = request.reason;
        appointment.share_medical_records = request.share_medical_records;

        let appointment = self.store.insert(appointment).await?;

        self.notify(NotificationType::AppointmentRequested, &appointment).await;

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }

    /// Provider-driven status change
    #[instrument(skip(self, principal, request), fields(new_status = %request.status))]
    pub async fn update_status(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get(appointment_id).await?;
        Self::ensure_owning_provider(principal, &current)?;

        self.lifecycle_service.validate_status_transition(current.status, request.status, TransitionActor::Provider)?;

        let mut updated = current.clone();
        updated.status = request.status;
        if let Some(note) = request.note {
            updated.notes = Some(note);
        }

        match request.status {
            AppointmentStatus::Rescheduled => {
                let proposed = request.new_date_time.ok_or_else(|| {
                    AppointmentError::ValidationError("A new date and time is required to reschedule".to_string())
                })?;
                self.ensure_bookable(current.doctor_id, proposed).await?;
                self.ensure_slot_free(&Appointment { appointment_date: proposed, ..updated.clone() }).await?;
                updated.proposed_date = Some(proposed);
            }
            AppointmentStatus::Confirmed => {
                updated.proposed_date = None;
                self.ensure_slot_free(&updated).await?;
            }
            _ => updated.proposed_date = None,
        }

        let saved = self.store.update_if_version(&updated).await?;
        info!("Appointment {} moved {} -> {}", saved.id, current.status, saved.status);

        if let Some(kind) = status_notification(saved.status) {
            self.notify(kind, &saved).await;
        }

        Ok(saved)
    }

    /// Patient answers a proposed new time
    #[instrument(skip(self, principal))]
    pub async fn respond_to_reschedule(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        decision: RescheduleDecision,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get(appointment_id).await?;
        if !(principal.is_patient() && current.patient_id == principal.id) {
            warn!("User {} tried to answer reschedule of appointment {}", principal.id, appointment_id);
            return Err(AppointmentError::Forbidden);
        }

        let target = match decision {
            RescheduleDecision::Accept => AppointmentStatus::Confirmed,
            RescheduleDecision::Reject => AppointmentStatus::Cancelled,
        };
        self.lifecycle_service.validate_status_transition(current.status, target, TransitionActor::Patient)?;

        let mut updated = current.clone();
        updated.status = target;

        if decision == RescheduleDecision::Accept {
            let proposed = current.proposed_date.ok_or_else(|| {
                AppointmentError::ValidationError("Appointment has no proposed time".to_string())
            })?;
            updated.appointment_date = proposed;
            self.ensure_slot_free(&updated).await?;
        }
        updated.proposed_date = None;

        let saved = self.store.update_if_version(&updated).await?;
        info!("Patient {} answered reschedule of {} with {:?}", principal.id, saved.id, decision);

        let kind = match decision {
            RescheduleDecision::Accept => NotificationType::RescheduleAccepted,
            RescheduleDecision::Reject => NotificationType::RescheduleRejected,
        };
        self.notify(kind, &saved).await;

        Ok(saved)
    }

    /// Complete a confirmed appointment, optionally requesting a follow-up
    #[instrument(skip(self, principal, request))]
    pub async fn complete_appointment(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        request: CompleteAppointmentRequest,
    ) -> Result<CompletionOutcome, AppointmentError> {
        let current = self.store.get(appointment_id).await?;
        Self::ensure_owning_provider(principal, &current)?;

        self.lifecycle_service.validate_status_transition(
            current.status,
            AppointmentStatus::Completed,
            TransitionActor::Provider,
        )?;

        // The follow-up slot is checked before anything is written
        let follow_up_duration = match request.follow_up_date {
            Some(follow_up_date) => {
                self.ensure_bookable(current.doctor_id, follow_up_date).await?;
                Some(self.availability.appointment_duration(current.doctor_id).await?)
            }
            None => None,
        };

        let mut updated = current.clone();
        updated.status = AppointmentStatus::Completed;
        if request.notes.is_some() {
            updated.notes = request.notes;
        }

        let completed = self.store.update_if_version(&updated).await?;
        info!("Appointment {} completed by doctor {}", completed.id, principal.id);

        let follow_up = match (request.follow_up_date, follow_up_duration) {
            (Some(follow_up_date), Some(duration_minutes)) => {
                let mut follow_up = Appointment::new_pending(
                    completed.patient_id,
                    completed.doctor_id,
                    follow_up_date,
                    completed.appointment_type,
                    duration_minutes,
                );
                follow_up.follow_up_of = Some(completed.id);
                follow_up.reason = Some("Follow-up".to_string());
                follow_up.share_medical_records = completed.share_medical_records;

                match self.store.insert(follow_up).await {
                    Ok(created) => Some(created),
                    Err(e) => {
                        error!("Follow-up for {} failed, reverting completion: {}", completed.id, e);
                        self.revert_completion(&current, &completed).await;
                        return Err(e);
                    }
                }
            }
            _ => None,
        };

        self.notify(NotificationType::AppointmentCompleted, &completed).await;
        if let Some(follow_up) = &follow_up {
            self.notify(NotificationType::FollowUpScheduled, follow_up).await;
        }

        Ok(CompletionOutcome {
            appointment: completed,
            follow_up,
        })
    }

    pub async fn start_call(&self, principal: &Principal, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.set_call_active(principal, appointment_id, true).await
    }

    pub async fn end_call(&self, principal: &Principal, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.set_call_active(principal, appointment_id, false).await
    }

    pub async fn get_appointment(&self, principal: &Principal, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.store.get(appointment_id).await?;
        if !(principal.is_admin() || appointment.is_participant(principal.id)) {
            return Err(AppointmentError::Forbidden);
        }
        Ok(appointment)
    }

    pub async fn list_my_appointments(
        &self,
        principal: &Principal,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments for {} (status {:?})", principal.id, status);

        if principal.is_provider() {
            self.store.list_for_doctor(principal.id, status).await
        } else {
            self.store.list_for_patient(principal.id, status).await
        }
    }

    // ==========================================================================
    // PRIVATE HELPER METHODS
    // ==========================================================================

    fn resolve_patient(&self, principal: &Principal, requested: Option<Uuid>) -> Result<Uuid, AppointmentError> {
        if principal.is_patient() {
            match requested {
                Some(patient_id) if patient_id != principal.id => Err(AppointmentError::Forbidden),
                _ => Ok(principal.id),
            }
        } else if principal.is_admin() {
            requested.ok_or_else(|| AppointmentError::ValidationError("patient_id is required".to_string()))
        } else {
            Err(AppointmentError::Forbidden)
        }
    }

    fn ensure_owning_provider(principal: &Principal, appointment: &Appointment) -> Result<(), AppointmentError> {
        if principal.is_provider() && appointment.doctor_id == principal.id {
            Ok(())
        } else {
            warn!("User {} is not the provider of appointment {}", principal.id, appointment.id);
            Err(AppointmentError::Forbidden)
        }
    }

    async fn ensure_bookable(&self, doctor_id: Uuid, start: DateTime<Utc>) -> Result<(), AppointmentError> {
        if start <= Utc::now() {
            return Err(AppointmentError::ValidationError("Appointment time must be in the future".to_string()));
        }
        if !self.availability.is_bookable(doctor_id, start).await? {
            warn!("Slot {} for doctor {} is not available", start, doctor_id);
            return Err(AppointmentError::SlotUnavailable);
        }
        Ok(())
    }

    /// The scheduled time of `appointment` must not overlap time held by another
    /// appointment of the same doctor, whether confirmed or offered in a reschedule.
    async fn ensure_slot_free(&self, appointment: &Appointment) -> Result<(), AppointmentError> {
        let wanted = BookedInterval::new(appointment.appointment_date, appointment.duration_minutes);
        let search_from = wanted.start - Duration::minutes(MAX_APPOINTMENT_DURATION_MINUTES as i64);

        let booked = self.store.booked_for_doctor(appointment.doctor_id, search_from, wanted.end).await?;
        let clash = booked
            .iter()
            .filter(|other| other.id != appointment.id)
            .map(Appointment::held_interval)
            .any(|held| held.start < wanted.end && wanted.start < held.end);

        if clash {
            warn!("Appointment {} overlaps time already held for doctor {}", appointment.id, appointment.doctor_id);
            return Err(AppointmentError::SlotUnavailable);
        }
        Ok(())
    }

    async fn set_call_active(
        &self,
        principal: &Principal,
        appointment_id: Uuid,
        active: bool,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get(appointment_id).await?;
        if !current.is_participant(principal.id) {
            return Err(AppointmentError::Forbidden);
        }
        if !current.is_video_call {
            return Err(AppointmentError::ValidationError("Appointment is not a video call".to_string()));
        }
        if current.status != AppointmentStatus::Confirmed {
            return Err(AppointmentError::InvalidTransition {
                from: current.status,
                to: current.status,
            });
        }
        if current.is_call_active == active {
            return Ok(current);
        }

        let mut updated = current;
        updated.is_call_active = active;
        let saved = self.store.update_if_version(&updated).await?;

        info!("Call on appointment {} {}", saved.id, if active { "started" } else { "ended" });
        Ok(saved)
    }

    async fn revert_completion(&self, original: &Appointment, completed: &Appointment) {
        let mut restored = original.clone();
        restored.version = completed.version;

        if let Err(e) = self.store.update_if_version(&restored).await {
            error!("Could not revert completion of appointment {}: {}", original.id, e);
        }
    }

    async fn notify(&self, kind: NotificationType, appointment: &Appointment) {
        if let Err(e) = self.notifier.notify(notification_for(kind, appointment)).await {
            warn!("Failed to send {} notification for appointment {}: {}", kind, appointment.id, e);
        }
    }
}
