pub mod dispatcher;
pub mod store;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::{NewNotification, Notification};

pub use dispatcher::NotificationDispatcher;
pub use store::{InMemoryNotificationStore, SupabaseNotificationStore};

/// Delivery seam used by the scheduling core. Implementations either persist
/// synchronously (stores) or hand off to a worker pool (dispatcher).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError>;
}

/// One delivery attempt bounded by `limit`.
pub async fn notify_within(
    sink: &dyn NotificationService,
    notification: NewNotification,
    limit: Duration,
) -> Result<(), NotificationError> {
    timeout(limit, sink.notify(notification))
        .await
        .map_err(|_| NotificationError::Timeout { limit })?
}

/// Recipient-facing read side of the notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: NewNotification) -> Result<Notification, NotificationError>;

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError>;

    async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> Result<Notification, NotificationError>;
}
