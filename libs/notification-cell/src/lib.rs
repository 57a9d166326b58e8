pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::NotificationError;
pub use models::*;
pub use services::{
    InMemoryNotificationStore, NotificationDispatcher, NotificationService, NotificationStore,
    SupabaseNotificationStore, notify_within,
};
