use std::time::Duration;

use shared_models::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification dispatcher is shut down")]
    ChannelClosed,

    #[error("Notification delivery timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification not found")]
    NotFound,

    #[error("Not allowed to modify this notification")]
    Forbidden,
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound => AppError::NotFound(err.to_string()),
            NotificationError::Forbidden => AppError::Forbidden(err.to_string()),
            NotificationError::QueueFull
            | NotificationError::ChannelClosed
            | NotificationError::Timeout { .. }
            | NotificationError::Delivery(_) => AppError::ExternalService(err.to_string()),
        }
    }
}
