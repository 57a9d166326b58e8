use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, DoctorState};
use crate::services::AvailabilityService;

pub fn doctor_routes(config: Arc<AppConfig>, availability: AvailabilityService) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots_public))
        .route("/{doctor_id}/slots", get(handlers::compute_slots_public));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/{doctor_id}/availability", get(handlers::list_day_availability))
        .route("/{doctor_id}/availability/{day_of_week}", put(handlers::set_day_availability))
        .route(
            "/{doctor_id}/blocked-slots",
            get(handlers::list_blocked_slots).post(handlers::create_blocked_slot),
        )
        .route("/{doctor_id}/blocked-slots/{slot_id}", delete(handlers::delete_blocked_slot))
        .route(
            "/{doctor_id}/scheduling-config",
            get(handlers::get_scheduling_config).put(handlers::update_scheduling_config),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(DoctorState { availability })
}
