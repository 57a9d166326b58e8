use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::NotificationListQuery;
use crate::services::NotificationStore;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Clone)]
pub struct NotificationState {
    pub store: Arc<dyn NotificationStore>,
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    Query(query): Query<NotificationListQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let notifications = state.store
        .list_for_recipient(principal.id, query.unread_only.unwrap_or(false), limit)
        .await?;

    Ok(Json(json!({
        "notifications": notifications,
        "total": notifications.len()
    })))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;

    let notification = state.store.mark_read(notification_id, principal.id).await?;

    Ok(Json(json!(notification)))
}
