use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;

use crate::chat::presence::Role;
use crate::state::ChatState;
use crate::ws::actor;

/// Query parameters carried on the upgrade request.
/// The identity claim is resolved upstream by the storefront's auth layer;
/// this server trusts it as given.
#[derive(Debug, Default, Deserialize)]
pub struct WsHandshakeQuery {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// GET /ws?userId=ID
/// Customer widget endpoint. A missing or blank userId still upgrades;
/// the connection just cannot chat.
pub async fn customer_ws_upgrade(
    State(state): State<ChatState>,
    Query(params): Query<WsHandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, params.user_id, Role::User)
}

/// GET /ws/admin?userId=ID
/// Admin dashboard endpoint. Reaching this route is what marks the session as staff.
pub async fn admin_ws_upgrade(
    State(state): State<ChatState>,
    Query(params): Query<WsHandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, params.user_id, Role::Admin)
}

fn upgrade(ws: WebSocketUpgrade, state: ChatState, claim: Option<String>, role: Role) -> Response {
    tracing::debug!(role = role.as_str(), has_claim = claim.is_some(), "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, claim, role))
}
