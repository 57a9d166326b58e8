use std::sync::Arc;

use axum::{
    Json, Router,
    routing::get,
};
use serde_json::json;

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentBookingService;
use doctor_cell::router::doctor_routes;
use doctor_cell::AvailabilityService;
use notification_cell::router::notification_routes;
use notification_cell::NotificationStore;
use shared_config::AppConfig;

/// Services shared by the HTTP layer.
pub struct AppServices {
    pub availability: AvailabilityService,
    pub booking: AppointmentBookingService,
    pub notifications: Arc<dyn NotificationStore>,
}

pub fn create_router(config: Arc<AppConfig>, services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({ "service": "mediconnect-api", "status": "ok" })) }))
        .nest("/appointments", appointment_routes(config.clone(), services.booking))
        .nest("/doctors", doctor_routes(config.clone(), services.availability))
        .nest("/notifications", notification_routes(config, services.notifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use appointment_cell::InMemoryAppointmentStore;
    use doctor_cell::InMemoryScheduleStore;
    use notification_cell::InMemoryNotificationStore;
    use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

    fn app(config: &TestConfig) -> Router {
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let availability = AvailabilityService::new(Arc::new(InMemoryScheduleStore::new()), appointments.clone());
        let booking = AppointmentBookingService::new(appointments, availability.clone(), notifications.clone());

        create_router(
            config.to_arc(),
            AppServices {
                availability,
                booking,
                notifications,
            },
        )
    }

    #[tokio::test]
    async fn root_reports_status() {
        let response = app(&TestConfig::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let response = app(&TestConfig::default())
            .oneshot(Request::builder().uri("/appointments/mine").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn slots_are_public_and_notifications_accept_a_valid_token() {
        let config = TestConfig::default();
        let doctor_id = uuid::Uuid::new_v4();

        let slots = app(&config)
            .oneshot(
                Request::builder()
                    .uri(format!("/doctors/{}/available-slots?date=2025-06-16", doctor_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(slots.status(), StatusCode::OK);

        let user = TestUser::patient("patient@example.com");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);
        let notifications = app(&config)
            .oneshot(
                Request::builder()
                    .uri("/notifications")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(notifications.status(), StatusCode::OK);
    }
}
