pub mod events;
pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::items::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/sync", post(handlers::handle_sync))
        .route("/api/v1/items", get(handlers::handle_list_items))
        .route(
            "/api/v1/items/:id/complete",
            patch(handlers::handle_complete_item),
        )
        .route(
            "/api/v1/items/:id/snooze",
            patch(handlers::handle_snooze_item),
        )
        .route("/api/v1/events", get(events::events_handler))
        .with_state(state)
}
