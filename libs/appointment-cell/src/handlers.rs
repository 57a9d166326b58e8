use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentListQuery, BookAppointmentRequest, CompleteAppointmentRequest,
    RescheduleResponseRequest, UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;

#[derive(Clone)]
pub struct AppointmentState {
    pub booking: AppointmentBookingService,
}

// ==============================================================================
// BOOKING AND QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let principal = user.principal()?;
    let appointment = state.booking.book_appointment(&principal, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointments = state.booking.list_my_appointments(&principal, query.status).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointment = state.booking.get_appointment(&principal, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// STATE TRANSITIONS
// ==============================================================================

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointment = state.booking.update_status(&principal, appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn respond_to_reschedule(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleResponseRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointment = state.booking
        .respond_to_reschedule(&principal, appointment_id, request.decision)
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let outcome = state.booking.complete_appointment(&principal, appointment_id, request).await?;

    Ok(Json(json!(outcome)))
}

#[axum::debug_handler]
pub async fn start_call(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointment = state.booking.start_call(&principal, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn end_call(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let appointment = state.booking.end_call(&principal, appointment_id).await?;

    Ok(Json(json!(appointment)))
}
