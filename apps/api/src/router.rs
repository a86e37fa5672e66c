use std::sync::Arc;

use axum::{routing::get, Router};

use queue_cell::router::queue_routes;
use scheduling_cell::router::appointment_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Front Desk API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/queue", queue_routes(state))
}
