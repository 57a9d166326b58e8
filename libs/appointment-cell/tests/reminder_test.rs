use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use uuid::Uuid;

use appointment_cell::*;
use notification_cell::{
    InMemoryNotificationStore, NewNotification, NotificationError, NotificationService, NotificationType,
};
use shared_config::ReminderSettings;

mock! {
    pub Notifier {}

    #[async_trait]
    impl NotificationService for Notifier {
        async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError>;
    }
}

/// Never answers within the scanner's timeout.
struct StalledNotifier;

#[async_trait]
impl NotificationService for StalledNotifier {
    async fn notify(&self, _notification: NewNotification) -> Result<(), NotificationError> {
        tokio::time::sleep(StdDuration::from_secs(5)).await;
        Ok(())
    }
}

fn scanner(store: Arc<InMemoryAppointmentStore>, notifier: Arc<dyn NotificationService>) -> ReminderScanner {
    ReminderScanner::new(store, notifier, ReminderSettings::default(), StdDuration::from_millis(200))
}

async fn confirmed_at(store: &InMemoryAppointmentStore, at: DateTime<Utc>) -> Appointment {
    let mut appointment = Appointment::new_pending(Uuid::new_v4(), Uuid::new_v4(), at, AppointmentType::InPerson, 30);
    appointment.status = AppointmentStatus::Confirmed;
    store.insert(appointment).await.unwrap()
}

#[tokio::test]
async fn appointment_thirty_hours_out_is_reminded_once() {
    let now = Utc::now();
    let store = Arc::new(InMemoryAppointmentStore::new());
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let appointment = confirmed_at(&store, now + Duration::hours(30)).await;

    let scanner = scanner(store.clone(), notifications.clone());
    let report = scanner.run_sweep(now).await.unwrap();

    assert_eq!(report, ReminderSweepReport { selected: 1, reminded: 1, failed: 0 });
    assert!(store.get(appointment.id).await.unwrap().reminder_24h_sent);

    let sent = notifications.all().await;
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.notification_type == NotificationType::AppointmentReminder));
    assert!(sent.iter().any(|n| n.recipient_id == appointment.patient_id));
    assert!(sent.iter().any(|n| n.recipient_id == appointment.doctor_id));

    // A second pass over the same data finds nothing left to do
    let again = scanner.run_sweep(now).await.unwrap();
    assert_eq!(again.selected, 0);
    assert_eq!(notifications.all().await.len(), 2);
}

#[tokio::test]
async fn only_confirmed_appointments_inside_the_window_are_selected() {
    let now = Utc::now();
    let store = Arc::new(InMemoryAppointmentStore::new());
    let notifications = Arc::new(InMemoryNotificationStore::new());

    confirmed_at(&store, now + Duration::hours(10)).await;
    confirmed_at(&store, now + Duration::hours(40)).await;
    let pending = Appointment::new_pending(
        Uuid::new_v4(),
        Uuid::new_v4(),
        now + Duration::hours(30),
        AppointmentType::Video,
        30,
    );
    store.insert(pending).await.unwrap();
    let inside = confirmed_at(&store, now + Duration::hours(25)).await;

    let report = scanner(store.clone(), notifications.clone()).run_sweep(now).await.unwrap();

    assert_eq!(report.selected, 1);
    assert_eq!(report.reminded, 1);
    assert!(store.get(inside.id).await.unwrap().reminder_24h_sent);
}

#[tokio::test]
async fn delivery_failure_leaves_flag_unset_for_the_next_sweep() {
    let now = Utc::now();
    let store = Arc::new(InMemoryAppointmentStore::new());
    let appointment = confirmed_at(&store, now + Duration::hours(30)).await;

    let mut failing = MockNotifier::new();
    failing
        .expect_notify()
        .times(2)
        .returning(|_| Err(NotificationError::Delivery("smtp down".to_string())));

    let report = scanner(store.clone(), Arc::new(failing)).run_sweep(now).await.unwrap();
    assert_eq!(report, ReminderSweepReport { selected: 1, reminded: 0, failed: 1 });
    assert!(!store.get(appointment.id).await.unwrap().reminder_24h_sent);

    let retry = scanner(store.clone(), Arc::new(InMemoryNotificationStore::new())).run_sweep(now).await.unwrap();
    assert_eq!(retry.reminded, 1);
    assert!(store.get(appointment.id).await.unwrap().reminder_24h_sent);
}

#[tokio::test]
async fn one_failing_item_does_not_abort_the_batch() {
    let now = Utc::now();
    let store = Arc::new(InMemoryAppointmentStore::new());
    let flaky = confirmed_at(&store, now + Duration::hours(26)).await;
    let healthy = confirmed_at(&store, now + Duration::hours(28)).await;

    let flaky_patient = flaky.patient_id;
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(4).returning(move |n| {
        if n.recipient_id == flaky_patient {
            Err(NotificationError::Delivery("bounced".to_string()))
        } else {
            Ok(())
        }
    });

    let report = scanner(store.clone(), Arc::new(notifier)).run_sweep(now).await.unwrap();

    assert_eq!(report, ReminderSweepReport { selected: 2, reminded: 1, failed: 1 });
    assert!(!store.get(flaky.id).await.unwrap().reminder_24h_sent);
    assert!(store.get(healthy.id).await.unwrap().reminder_24h_sent);
}

#[tokio::test]
async fn slow_delivery_times_out() {
    let now = Utc::now();
    let store = Arc::new(InMemoryAppointmentStore::new());
    let appointment = confirmed_at(&store, now + Duration::hours(30)).await;

    let report = scanner(store.clone(), Arc::new(StalledNotifier)).run_sweep(now).await.unwrap();

    assert_eq!(report.failed, 1);
    assert!(!store.get(appointment.id).await.unwrap().reminder_24h_sent);
}

#[tokio::test]
async fn window_comes_from_settings() {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let settings = ReminderSettings {
        sweep_interval_hours: 1,
        window_start_hours: 2,
        window_end_hours: 48,
    };
    let scanner = ReminderScanner::new(
        store.clone(),
        Arc::new(InMemoryNotificationStore::new()),
        settings,
        StdDuration::from_secs(1),
    );

    let now = Utc::now();
    let (from, to) = scanner.window(now);
    assert_eq!(from, now + Duration::hours(2));
    assert_eq!(to, now + Duration::hours(48));

    confirmed_at(&store, now + Duration::hours(3)).await;
    assert_eq!(scanner.run_sweep(now).await.unwrap().reminded, 1);
}

#[tokio::test]
async fn marking_reminder_is_monotonic() {
    let store = InMemoryAppointmentStore::new();
    let appointment = confirmed_at(&store, Utc::now() + Duration::hours(30)).await;

    assert!(store.mark_reminder_sent(appointment.id).await.unwrap());
    assert!(!store.mark_reminder_sent(appointment.id).await.unwrap());

    // A regular update never clears the flag
    let mut stale_copy = store.get(appointment.id).await.unwrap();
    stale_copy.reminder_24h_sent = false;
    let updated = store.update_if_version(&stale_copy).await.unwrap();
    assert!(updated.reminder_24h_sent);
}

#[tokio::test]
async fn window_is_bounded_for_extreme_settings() {
    let settings = ReminderSettings {
        sweep_interval_hours: u64::MAX,
        window_start_hours: i64::MIN,
        window_end_hours: i64::MAX,
    };
    let scanner = ReminderScanner::new(
        Arc::new(InMemoryAppointmentStore::new()),
        Arc::new(InMemoryNotificationStore::new()),
        settings,
        StdDuration::from_secs(1),
    );

    let now = Utc::now();
    let (from, to) = scanner.window(now);
    assert_eq!(from, now);
    assert_eq!(to, now + Duration::hours(shared_config::MAX_REMINDER_HOURS));
}
