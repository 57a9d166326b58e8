use notification_cell::{NewNotification, NotificationType};

use crate::models::{Appointment, AppointmentStatus};

fn when(appointment: &Appointment) -> String {
    appointment.appointment_date.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Builds the notification for `kind`, addressed to whichever side of the
/// appointment needs to hear about it.
pub fn notification_for(kind: NotificationType, appointment: &Appointment) -> NewNotification {
    let (recipient, title, message) = match kind {
        NotificationType::AppointmentRequested => (
            appointment.doctor_id,
            "New appointment request".to_string(),
            format!("A patient requested an appointment on {}", when(appointment)),
        ),
        NotificationType::AppointmentConfirmed => (
            appointment.patient_id,
            "Appointment confirmed".to_string(),
            format!("Your appointment on {} is confirmed", when(appointment)),
        ),
        NotificationType::AppointmentCancelled => (
            appointment.patient_id,
            "Appointment cancelled".to_string(),
            format!("Your appointment on {} was cancelled", when(appointment)),
        ),
        NotificationType::AppointmentRescheduled => (
            appointment.patient_id,
            "New time proposed".to_string(),
            match appointment.proposed_date {
                Some(proposed) => format!(
                    "Your doctor proposed moving your appointment to {}",
                    proposed.format("%Y-%m-%d %H:%M UTC")
                ),
                None => "Your doctor proposed a new appointment time".to_string(),
            },
        ),
        NotificationType::RescheduleAccepted => (
            appointment.doctor_id,
            "Reschedule accepted".to_string(),
            format!("The patient accepted the new time {}", when(appointment)),
        ),
        NotificationType::RescheduleRejected => (
            appointment.doctor_id,
            "Reschedule rejected".to_string(),
            "The patient rejected the proposed time and the appointment was cancelled".to_string(),
        ),
        NotificationType::AppointmentCompleted => (
            appointment.patient_id,
            "Appointment completed".to_string(),
            format!("Your appointment on {} is complete", when(appointment)),
        ),
        NotificationType::FollowUpScheduled => (
            appointment.patient_id,
            "Follow-up requested".to_string(),
            format!("A follow-up appointment was requested for {}", when(appointment)),
        ),
        NotificationType::AppointmentReminder => (
            appointment.patient_id,
            "Appointment reminder".to_string(),
            format!("Reminder: you have an appointment on {}", when(appointment)),
        ),
    };

    NewNotification::new(recipient, kind, Some(appointment.id), title, message)
        .with_field("appointment_id", appointment.id)
        .with_field("appointment_date", appointment.appointment_date)
}

/// Notification sent to the patient after a provider moves the appointment to `status`.
pub fn status_notification(status: AppointmentStatus) -> Option<NotificationType> {
    match status {
        AppointmentStatus::Confirmed => Some(NotificationType::AppointmentConfirmed),
        AppointmentStatus::Cancelled => Some(NotificationType::AppointmentCancelled),
        AppointmentStatus::Rescheduled => Some(NotificationType::AppointmentRescheduled),
        AppointmentStatus::Completed => Some(NotificationType::AppointmentCompleted),
        AppointmentStatus::Pending => None,
    }
}

/// One reminder per participant.
pub fn reminders_for(appointment: &Appointment) -> [NewNotification; 2] {
    let patient = notification_for(NotificationType::AppointmentReminder, appointment);
    let provider = NewNotification::new(
        appointment.doctor_id,
        NotificationType::AppointmentReminder,
        Some(appointment.id),
        "Upcoming appointment",
        format!("You have an appointment on {}", when(appointment)),
    )
    .with_field("appointment_id", appointment.id)
    .with_field("appointment_date", appointment.appointment_date);

    [patient, provider]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentType;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn appointment() -> Appointment {
        let at = Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 0).unwrap();
        Appointment::new_pending(Uuid::new_v4(), Uuid::new_v4(), at, AppointmentType::InPerson, 30)
    }

    #[test]
    fn requests_go_to_the_provider_and_outcomes_to_the_patient() {
        let appt = appointment();

        assert_eq!(notification_for(NotificationType::AppointmentRequested, &appt).recipient_id, appt.doctor_id);
        assert_eq!(notification_for(NotificationType::AppointmentConfirmed, &appt).recipient_id, appt.patient_id);
        assert_eq!(notification_for(NotificationType::RescheduleRejected, &appt).recipient_id, appt.doctor_id);
    }

    #[test]
    fn payload_references_the_appointment() {
        let appt = appointment();
        let n = notification_for(NotificationType::AppointmentConfirmed, &appt);

        assert_eq!(n.related_entity_id, Some(appt.id));
        assert_eq!(n.title(), Some("Appointment confirmed"));
        assert!(n.payload["message"].as_str().unwrap().contains("2025-06-16 09:00"));
    }

    #[test]
    fn reminders_cover_both_participants() {
        let appt = appointment();
        let [patient, provider] = reminders_for(&appt);

        assert_eq!(patient.recipient_id, appt.patient_id);
        assert_eq!(provider.recipient_id, appt.doctor_id);
        assert_eq!(provider.notification_type, NotificationType::AppointmentReminder);
    }

    #[test]
    fn pending_has_no_status_notification() {
        assert_eq!(status_notification(AppointmentStatus::Pending), None);
        assert_eq!(status_notification(AppointmentStatus::Cancelled), Some(NotificationType::AppointmentCancelled));
    }
}
