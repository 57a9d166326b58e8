use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateBlockedSlotRequest, UpdateSchedulingConfigRequest, UpsertDayAvailabilityRequest};
use crate::services::AvailabilityService;

#[derive(Clone)]
pub struct DoctorState {
    pub availability: AvailabilityService,
}

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SlotWindowQuery {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct BlockedSlotsQuery {
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots_public(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.availability.available_slots(doctor_id, query.date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn compute_slots_public(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotWindowQuery>,
) -> Result<Json<Value>, AppError> {
    let duration = match query.duration_minutes {
        Some(minutes) => minutes,
        None => state.availability.appointment_duration(doctor_id).await?,
    };

    let slots = state.availability
        .compute_slots(doctor_id, query.date, &query.start_time, &query.end_time, duration)
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "duration_minutes": duration,
        "slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// PROTECTED HANDLERS (DOCTOR OWNS THE SCHEDULE)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_day_availability(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let days = state.availability.list_day_availability(&principal, doctor_id).await?;

    Ok(Json(json!({
        "availability": days,
        "total": days.len()
    })))
}

#[axum::debug_handler]
pub async fn set_day_availability(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path((doctor_id, day_of_week)): Path<(Uuid, i32)>,
    Json(request): Json<UpsertDayAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let saved = state.availability
        .set_day_availability(&principal, doctor_id, day_of_week, request)
        .await?;

    Ok(Json(json!(saved)))
}

#[axum::debug_handler]
pub async fn list_blocked_slots(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<BlockedSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let blocks = state.availability.list_blocked_slots(&principal, doctor_id, query.date).await?;

    Ok(Json(json!({
        "blocked_slots": blocks,
        "total": blocks.len()
    })))
}

#[axum::debug_handler]
pub async fn create_blocked_slot(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<CreateBlockedSlotRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let principal = user.principal()?;
    let block = state.availability.block_time(&principal, doctor_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(block))))
}

#[axum::debug_handler]
pub async fn delete_blocked_slot(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path((doctor_id, slot_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let principal = user.principal()?;
    state.availability.unblock_time(&principal, doctor_id, slot_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn get_scheduling_config(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let config = state.availability.scheduling_config(&principal, doctor_id).await?;

    Ok(Json(json!(config)))
}

#[axum::debug_handler]
pub async fn update_scheduling_config(
    State(state): State<DoctorState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateSchedulingConfigRequest>,
) -> Result<Json<Value>, AppError> {
    let principal = user.principal()?;
    let config = state.availability
        .set_appointment_duration(&principal, doctor_id, request.appointment_duration_minutes)
        .await?;

    Ok(Json(json!(config)))
}
