//! REST fallback for message history and posting.
//!
//! Same semantics as the realtime path's store operations, for clients that
//! cannot hold a WebSocket open. Posting here persists only; it does not fan
//! out to live connections.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::chat::router::validate_text;
use crate::db::models::{Message, NewMessage, Origin};
use crate::error::StoreError;
use crate::state::ChatState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub text: String,
    /// Defaults to `admin` when the sender is the admin id, `user` otherwise
    #[serde(default, rename = "from")]
    pub origin: Option<Origin>,
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /api/conversations/{a}/{b}
/// All messages between two participants, oldest first.
pub async fn get_conversation(
    State(state): State<ChatState>,
    Path((a, b)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let messages = state.store.find_conversation(&a, &b).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to load conversation");
        store_status(&e)
    })?;
    Ok(Json(messages))
}

/// POST /api/messages
/// Persist a message without live delivery.
pub async fn create_message(
    State(state): State<ChatState>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), StatusCode> {
    let text = validate_text(&body.text, state.chat.max_text_length)
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let origin = body.origin.unwrap_or(if body.sender_id == state.chat.admin_id {
        Origin::Admin
    } else {
        Origin::User
    });

    let message = state
        .store
        .append(NewMessage {
            sender_id: body.sender_id,
            receiver_id: body.receiver_id,
            text,
            origin,
        })
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "REST message append failed");
            store_status(&e)
        })?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{id}
/// One stored message, including its current read flag.
pub async fn get_message(
    State(state): State<ChatState>,
    Path(id): Path<String>,
) -> Result<Json<Message>, StatusCode> {
    let message = state.store.get(&id).await.map_err(|e| {
        tracing::error!(error = %e, message_id = %id, "Failed to load message");
        store_status(&e)
    })?;
    message.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/messages/{id}/read
/// Idempotent; unknown ids are accepted too.
pub async fn mark_message_read(
    State(state): State<ChatState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    state.store.mark_read(&id).await.map_err(|e| {
        tracing::error!(error = %e, message_id = %id, "Failed to mark message read");
        store_status(&e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}
