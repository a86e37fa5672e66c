use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSearchQuery, BookAppointmentRequest, ConflictCheckQuery,
    ConflictCheckResponse, SchedulingError, UpdateAppointmentRequest,
    DEFAULT_DURATION_MINUTES,
};
use crate::services::booking::SchedulingService;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;

fn map_scheduling_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        SchedulingError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        SchedulingError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        SchedulingError::InvalidInput(msg) | SchedulingError::InvalidState(msg) => {
            AppError::BadRequest(msg)
        }
        SchedulingError::Conflict(msg) => AppError::Conflict(msg),
        SchedulingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn actor_id(user: &User) -> Result<i64, AppError> {
    user.staff_id()
        .ok_or_else(|| AppError::Auth("Token subject is not a staff id".to_string()))
}

fn require_front_desk(user: &User) -> Result<(), AppError> {
    if !user.is_front_desk() {
        return Err(AppError::Auth(
            "Not authorized to manage appointments".to_string(),
        ));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;
    let actor = actor_id(&user)?;

    let service = SchedulingService::new(&state);
    let appointment = service
        .book(request, actor, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let token = auth.token();

    let service = SchedulingService::new(&state);
    let appointments = service
        .search(query, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();

    let service = SchedulingService::new(&state);
    let appointment = service
        .get(appointment_id, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .update(appointment_id, request, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = AppointmentLifecycleService::new(&state);
    let appointment = service
        .cancel(appointment_id, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = SchedulingService::new(&state);
    service
        .remove(appointment_id, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({ "deleted": true })))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<ConflictCheckResponse>, AppError> {
    let token = auth.token();

    let duration = query.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    let end = Appointment::end_time(query.scheduled_at, duration);

    let service = ConflictDetectionService::new(&state);
    let conflicting = service
        .check_conflict(
            query.doctor_id,
            query.scheduled_at,
            end,
            query.exclude_appointment_id,
            token,
        )
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(ConflictCheckResponse {
        has_conflict: conflicting.is_some(),
        conflicting_appointment: conflicting,
    }))
}
