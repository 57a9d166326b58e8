use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use shared_config::NotificationSettings;

use crate::error::NotificationError;
use crate::models::{DispatcherStats, NewNotification};
use crate::services::{notify_within, NotificationService};

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Bounded fan-out queue drained by a fixed pool of worker tasks.
/// `notify` only enqueues, so callers never wait on delivery.
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NewNotification>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl NotificationDispatcher {
    /// Must be called from inside a tokio runtime.
    pub fn start(sink: Arc<dyn NotificationService>, settings: &NotificationSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let send_timeout = settings.send_timeout();

        let workers = (0..settings.workers.max(1))
            .map(|i| {
                let worker_name = format!("notification-worker-{}", i);
                let receiver = Arc::clone(&receiver);
                let sink = Arc::clone(&sink);
                let counters = Arc::clone(&counters);

                tokio::spawn(async move {
                    worker_loop(worker_name, receiver, sink, counters, send_timeout).await
                })
            })
            .collect::<Vec<_>>();

        info!("Started notification dispatcher with {} workers", workers.len());

        Self {
            sender,
            workers,
            counters,
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait until every enqueued notification was attempted.
    pub async fn drain(self) -> DispatcherStats {
        let Self { sender, workers, counters } = self;
        drop(sender);

        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!("Notification worker panicked: {}", e);
            }
        }

        DispatcherStats {
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl NotificationService for NotificationDispatcher {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError> {
        match self.sender.try_send(notification) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Notification queue full, dropping {} for {}", dropped.notification_type, dropped.recipient_id);
                Err(NotificationError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(NotificationError::ChannelClosed)
            }
        }
    }
}

#[instrument(skip(receiver, sink, counters))]
async fn worker_loop(
    worker_name: String,
    receiver: Arc<Mutex<mpsc::Receiver<NewNotification>>>,
    sink: Arc<dyn NotificationService>,
    counters: Arc<Counters>,
    send_timeout: Duration,
) {
    debug!("Worker loop started: {}", worker_name);

    loop {
        let next = {
            let mut guard = receiver.lock().await;
            guard.recv().await
        };

        let Some(notification) = next else {
            break;
        };

        let kind = notification.notification_type;
        let recipient = notification.recipient_id;

        match notify_within(sink.as_ref(), notification, send_timeout).await {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("{} delivered {} to {}", worker_name, kind, recipient);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("{} failed to deliver {} to {}: {}", worker_name, kind, recipient, e);
            }
        }
    }

    debug!("Worker loop ended: {}", worker_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;
    use crate::services::MockNotificationService;
    use uuid::Uuid;

    fn settings(workers: usize, queue_capacity: usize) -> NotificationSettings {
        NotificationSettings {
            send_timeout_secs: 1,
            workers,
            queue_capacity,
        }
    }

    fn sample() -> NewNotification {
        NewNotification::new(
            Uuid::new_v4(),
            NotificationType::AppointmentConfirmed,
            None,
            "Confirmed",
            "Your appointment was confirmed",
        )
    }

    #[tokio::test]
    async fn delivers_every_enqueued_notification() {
        let mut sink = MockNotificationService::new();
        sink.expect_notify().times(3).returning(|_| Ok(()));

        let dispatcher = NotificationDispatcher::start(Arc::new(sink), &settings(2, 8));
        for _ in 0..3 {
            dispatcher.notify(sample()).await.unwrap();
        }

        let stats = dispatcher.drain().await;
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.failed, 0);
    }

    struct StalledSink;

    #[async_trait]
    impl NotificationService for StalledSink {
        async fn notify(&self, _notification: NewNotification) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_sink_surfaces_as_timeout() {
        let limit = Duration::from_millis(50);
        let result = notify_within(&StalledSink, sample(), limit).await;

        assert!(matches!(result, Err(NotificationError::Timeout { limit: l }) if l == limit));
    }

    #[tokio::test]
    async fn sink_failures_are_counted_not_propagated() {
        let mut sink = MockNotificationService::new();
        sink.expect_notify()
            .returning(|_| Err(NotificationError::Delivery("smtp down".into())));

        let dispatcher = NotificationDispatcher::start(Arc::new(sink), &settings(1, 4));
        assert!(dispatcher.notify(sample()).await.is_ok());

        let stats = dispatcher.drain().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
    }
}
