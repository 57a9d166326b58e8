use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, NotificationState};
use crate::services::NotificationStore;

pub fn notification_routes(config: Arc<AppConfig>, store: Arc<dyn NotificationStore>) -> Router {
    Router::new()
        .route("/", get(handlers::list_notifications))
        .route("/{notification_id}/read", patch(handlers::mark_notification_read))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(NotificationState { store })
}
