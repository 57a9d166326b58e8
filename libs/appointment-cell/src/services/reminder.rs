use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use notification_cell::{notify_within, NewNotification, NotificationService};
use shared_config::{ReminderSettings, MAX_REMINDER_HOURS};

use crate::models::{Appointment, AppointmentError, ReminderSweepReport};
use crate::services::notifications::reminders_for;
use crate::services::store::AppointmentStore;

/// Finds CONFIRMED appointments entering the reminder window and notifies
/// both participants once.
#[derive(Clone)]
pub struct ReminderScanner {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn NotificationService>,
    settings: ReminderSettings,
    send_timeout: Duration,
}

impl ReminderScanner {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationService>,
        settings: ReminderSettings,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
            send_timeout,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now + chrono::Duration::hours(self.settings.window_start_hours.clamp(0, MAX_REMINDER_HOURS)),
            now + chrono::Duration::hours(self.settings.window_end_hours.clamp(0, MAX_REMINDER_HOURS)),
        )
    }

    /// One pass over the window. Only the candidate query can fail the whole
    /// sweep; per-appointment failures are counted and logged.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<ReminderSweepReport, AppointmentError> {
        let (from, to) = self.window(now);
        let candidates = self.store.reminder_candidates(from, to).await?;

        let mut report = ReminderSweepReport {
            selected: candidates.len(),
            ..Default::default()
        };
        debug!("Reminder sweep selected {} appointments between {} and {}", report.selected, from, to);

        for appointment in &candidates {
            if self.remind(appointment).await {
                report.reminded += 1;
            } else {
                report.failed += 1;
            }
        }

        info!("Reminder sweep done: {} selected, {} reminded, {} failed",
              report.selected, report.reminded, report.failed);
        Ok(report)
    }

    async fn remind(&self, appointment: &Appointment) -> bool {
        let [patient, provider] = reminders_for(appointment);
        let (patient_sent, provider_sent) = futures::future::join(
            self.send(patient),
            self.send(provider),
        ).await;

        if !(patient_sent && provider_sent) {
            warn!("Reminder for appointment {} not fully delivered, will retry next sweep", appointment.id);
            return false;
        }

        match self.store.mark_reminder_sent(appointment.id).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Reminder flag for {} was already set", appointment.id);
                true
            }
            Err(e) => {
                error!("Failed to flag reminder for appointment {}: {}", appointment.id, e);
                false
            }
        }
    }

    async fn send(&self, notification: NewNotification) -> bool {
        let recipient = notification.recipient_id;
        match notify_within(self.notifier.as_ref(), notification, self.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Reminder to {} failed: {}", recipient, e);
                false
            }
        }
    }
}

/// Background service running reminder sweeps on a fixed period
pub struct ReminderScheduler {
    scanner: ReminderScanner,
    period: Duration,
}

impl ReminderScheduler {
    pub fn new(scanner: ReminderScanner, settings: &ReminderSettings) -> Self {
        Self {
            scanner,
            // tokio's interval rejects a zero period
            period: settings.sweep_interval().max(Duration::from_secs(1)),
        }
    }

    /// Sweeps immediately, then once per period. Runs until the task is aborted.
    #[instrument(name = "reminder_scheduler", skip(self))]
    pub async fn run(self) {
        info!("Starting reminder scheduler, sweeping every {:?}", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.scanner.run_sweep(Utc::now()).await {
                error!("Reminder sweep failed: {}", e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
