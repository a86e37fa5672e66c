use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn queue_routes(state: Arc<AppConfig>) -> Router {
    // Every queue operation requires an authenticated front-desk user
    let protected_routes = Router::new()
        .route("/", post(handlers::add_to_queue))
        .route("/", get(handlers::list_queue))
        .route("/stats", get(handlers::get_queue_stats))
        .route("/{entry_id}", get(handlers::get_queue_entry))
        .route("/{entry_id}", delete(handlers::delete_queue_entry))
        .route("/{entry_id}/status", patch(handlers::update_queue_status))
        .route("/{entry_id}/skip", patch(handlers::skip_queue_entry))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
