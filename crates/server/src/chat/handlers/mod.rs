//! Presence and Relay Routes
//!
//! The WebSocket endpoint carries all real-time events; the HTTP routes are
//! read-only views of presence.

use crate::core::AppState;
use axum::{routing::get, Router};

pub mod presence;
pub mod ws;

pub fn router() -> Router<AppState> {
    Router::new()
        // Real-time channel
        .route("/ws", get(ws::ws_handler))
        // Presence views
        .route("/presence", get(presence::get_presence))
        .route("/users/{uid}", get(presence::get_user_presence))
}
