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
    AddToQueueRequest, QueueEntry, QueueError, QueueListQuery, QueueStats,
    UpdateQueueStatusRequest,
};
use crate::services::queue::QueueService;

fn require_front_desk(user: &User) -> Result<(), AppError> {
    if !user.is_front_desk() {
        return Err(AppError::Auth(
            "Not authorized to manage the queue".to_string(),
        ));
    }
    Ok(())
}

fn map_queue_error(e: QueueError) -> AppError {
    match e {
        QueueError::NotFound => AppError::NotFound("Queue entry not found".to_string()),
        QueueError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        QueueError::InvalidInput(msg) | QueueError::InvalidState(msg) => AppError::BadRequest(msg),
        QueueError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn add_to_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AddToQueueRequest>,
) -> Result<Json<QueueEntry>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = QueueService::new(&state);
    let entry = service.admit(request, token).await.map_err(map_queue_error)?;

    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn list_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    let token = auth.token();

    let service = QueueService::new(&state);
    let entries = service
        .list(query.status, token)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(entries))
}

#[axum::debug_handler]
pub async fn get_queue_stats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<QueueStats>, AppError> {
    let token = auth.token();

    let service = QueueService::new(&state);
    let stats = service.stats(token).await.map_err(map_queue_error)?;

    Ok(Json(stats))
}

#[axum::debug_handler]
pub async fn get_queue_entry(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(entry_id): Path<i64>,
) -> Result<Json<QueueEntry>, AppError> {
    let token = auth.token();

    let service = QueueService::new(&state);
    let entry = service.get(entry_id, token).await.map_err(map_queue_error)?;

    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn update_queue_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(entry_id): Path<i64>,
    Json(request): Json<UpdateQueueStatusRequest>,
) -> Result<Json<QueueEntry>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = QueueService::new(&state);
    let entry = service
        .update_status(entry_id, request, token)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn skip_queue_entry(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(entry_id): Path<i64>,
) -> Result<Json<QueueEntry>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = QueueService::new(&state);
    let entry = service.skip(entry_id, token).await.map_err(map_queue_error)?;

    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn delete_queue_entry(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(entry_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    require_front_desk(&user)?;

    let service = QueueService::new(&state);
    service
        .remove(entry_id, token)
        .await
        .map_err(map_queue_error)?;

    Ok(Json(json!({ "deleted": true })))
}
