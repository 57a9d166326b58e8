use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    AppointmentRequested,
    AppointmentConfirmed,
    AppointmentCancelled,
    AppointmentRescheduled,
    RescheduleAccepted,
    RescheduleRejected,
    AppointmentCompleted,
    FollowUpScheduled,
    AppointmentReminder,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match self {
            NotificationType::AppointmentRequested => "appointment_requested",
            NotificationType::AppointmentConfirmed => "appointment_confirmed",
            NotificationType::AppointmentCancelled => "appointment_cancelled",
            NotificationType::AppointmentRescheduled => "appointment_rescheduled",
            NotificationType::RescheduleAccepted => "reschedule_accepted",
            NotificationType::RescheduleRejected => "reschedule_rejected",
            NotificationType::AppointmentCompleted => "appointment_completed",
            NotificationType::FollowUpScheduled => "follow_up_scheduled",
            NotificationType::AppointmentReminder => "appointment_reminder",
        };
        write!(f, "{}", raw)
    }
}

/// A persisted notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub related_entity_id: Option<Uuid>,
    pub payload: Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// What callers hand to a `NotificationService`; the store assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub related_entity_id: Option<Uuid>,
    pub payload: Value,
}

impl NewNotification {
    pub fn new(
        recipient_id: Uuid,
        notification_type: NotificationType,
        related_entity_id: Option<Uuid>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            notification_type,
            related_entity_id,
            payload: json!({
                "title": title.into(),
                "message": message.into(),
            }),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Serialize) -> Self {
        if let Value::Object(map) = &mut self.payload {
            map.insert(key.to_string(), json!(value));
        }
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.payload.get("title").and_then(Value::as_str)
    }

    pub fn into_record(self) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id: self.recipient_id,
            notification_type: self.notification_type,
            related_entity_id: self.related_entity_id,
            payload: self.payload,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationListQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<usize>,
}

/// Counters exposed by the dispatcher worker pool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatcherStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_title_message_and_extra_fields() {
        let appointment_id = Uuid::new_v4();
        let notification = NewNotification::new(
            Uuid::new_v4(),
            NotificationType::AppointmentReminder,
            Some(appointment_id),
            "Reminder",
            "Your appointment is tomorrow",
        )
        .with_field("appointment_id", appointment_id);

        assert_eq!(notification.title(), Some("Reminder"));
        assert_eq!(notification.payload["message"], "Your appointment is tomorrow");
        assert_eq!(notification.payload["appointment_id"], json!(appointment_id));
    }

    #[test]
    fn type_serializes_snake_case() {
        let raw = serde_json::to_value(NotificationType::RescheduleAccepted).unwrap();
        assert_eq!(raw, json!("reschedule_accepted"));
        assert_eq!(NotificationType::RescheduleAccepted.to_string(), "reschedule_accepted");
    }
}
