//! WebSocket endpoint that forwards one user's dashboard events.
//!
//! Transport only: subscribe to the bus, filter by user, forward until the
//! client goes away. Reconnection and catch-up are the client's problem —
//! a fresh read of `/api/v1/items` after reconnect covers anything missed.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub user_id: i64,
}

/// GET /api/v1/events
pub async fn events_handler(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| forward_events(socket, state, params.user_id))
}

async fn forward_events(mut socket: WebSocket, state: AppState, user_id: i64) {
    let mut rx = state.events.subscribe();
    debug!("dashboard listener connected for user {user_id}");
    loop {
        match rx.recv().await {
            Ok(event) if event.user_id() == user_id => {
                let Ok(payload) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!("dashboard listener for user {user_id} lagged by {skipped} events");
                continue;
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("dashboard listener disconnected for user {user_id}");
}
