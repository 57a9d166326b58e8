use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::NotificationError;
use crate::models::{NewNotification, Notification};
use crate::services::{NotificationService, NotificationStore};

const NOTIFICATIONS_PATH: &str = "/rest/v1/notifications";

pub struct SupabaseNotificationStore {
    supabase: SupabaseClient,
}

impl SupabaseNotificationStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Notification>, NotificationError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Notification>, _>>()
            .map_err(|e| NotificationError::Delivery(format!("Malformed notification row: {}", e)))
    }
}

#[async_trait]
impl NotificationStore for SupabaseNotificationStore {
    async fn insert(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        debug!("Persisting {} notification for {}", notification.notification_type, notification.recipient_id);

        let record = notification.into_record();
        let body = json!(record);

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            NOTIFICATIONS_PATH,
            None,
            Some(body),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| {
            error!("Failed to persist notification {}: {}", record.id, e);
            NotificationError::Delivery(e.to_string())
        })?;

        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::Delivery("Insert returned no rows".to_string()))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut path = format!(
            "{}?recipient_id=eq.{}&order=created_at.desc&limit={}",
            NOTIFICATIONS_PATH, recipient_id, limit
        );
        if unread_only {
            path.push_str("&is_read=eq.false");
        }

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        Self::parse_rows(rows)
    }

    async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> Result<Notification, NotificationError> {
        let path = format!(
            "{}?id=eq.{}&recipient_id=eq.{}",
            NOTIFICATIONS_PATH, notification_id, recipient_id
        );

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            None,
            Some(json!({ "is_read": true })),
            Some(SupabaseClient::representation_headers()),
        ).await.map_err(|e| NotificationError::Delivery(e.to_string()))?;

        // The recipient filter hides rows owned by someone else, so an empty result covers both cases
        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(NotificationError::NotFound)
    }
}

#[async_trait]
impl NotificationService for SupabaseNotificationStore {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError> {
        self.insert(notification).await.map(|_| ())
    }
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: RwLock<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Notification> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        let record = notification.into_record();
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        let records = self.records.read().await;
        let mut matching: Vec<Notification> = records
            .iter()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> Result<Notification, NotificationError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or(NotificationError::NotFound)?;

        if record.recipient_id != recipient_id {
            return Err(NotificationError::Forbidden);
        }

        record.is_read = true;
        Ok(record.clone())
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationStore {
    async fn notify(&self, notification: NewNotification) -> Result<(), NotificationError> {
        self.insert(notification).await.map(|_| ())
    }
}
