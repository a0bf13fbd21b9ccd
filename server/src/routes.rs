use axum::{routing::get, routing::post, Router};

use crate::chat::{messages, presence};
use crate::state::ChatState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
pub fn build_router(state: ChatState) -> Router {
    // WebSocket endpoints; identity arrives as a query parameter
    let ws_routes = Router::new()
        .route("/ws", get(ws_handler::customer_ws_upgrade))
        .route("/ws/admin", get(ws_handler::admin_ws_upgrade));

    // Non-realtime fallback for history and posting
    let message_routes = Router::new()
        .route("/api/conversations/{a}/{b}", get(messages::get_conversation))
        .route("/api/messages", post(messages::create_message))
        .route("/api/messages/{id}", get(messages::get_message))
        .route("/api/messages/{id}/read", post(messages::mark_message_read))
        .route("/api/presence", get(presence::get_presence));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(message_routes)
        .merge(health)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
