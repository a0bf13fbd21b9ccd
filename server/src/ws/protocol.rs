//! JSON wire protocol.
//!
//! Every frame is a text frame of the form `{"event": "<name>", "data": <payload>}`.
//! Event names match what the storefront widget and admin dashboard already emit,
//! including the historical `seleted-user-messages` spelling.

use axum::extract::ws::Message as WsMessage;
use serde::{Deserialize, Serialize};

use crate::db::models::Message;
use crate::error::ChatError;
use crate::ws::{ConnectionHandle, ConnectionId};

// --- Client -> server ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Customer message; routed to every live admin unless a receiver is named.
    #[serde(rename = "send-message")]
    SendMessage(SendMessagePayload),
    /// Admin reply to one customer.
    #[serde(rename = "admin-message-sent")]
    AdminMessageSent(AdminMessagePayload),
    /// History request for the conversation with `senderId`.
    #[serde(rename = "seleted-user-messages", alias = "request-history")]
    RequestHistory(HistoryRequestPayload),
    #[serde(rename = "mark-read")]
    MarkRead(MarkReadPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Client-side id echoed back in the acknowledgement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminMessagePayload {
    /// Informational only; the sender is always taken from the connection binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub receiver: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequestPayload {
    pub sender_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadPayload {
    pub id: String,
}

// --- Server -> client ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Live customer connections, sent to admins.
    #[serde(rename = "active-users")]
    ActiveUsers(Vec<ActiveUser>),
    /// Conversation replay, oldest first.
    #[serde(rename = "previous-messages")]
    PreviousMessages(Vec<Message>),
    #[serde(rename = "receive-message")]
    ReceiveMessage(Message),
    /// Acknowledgement to the connection that issued the send.
    #[serde(rename = "message-sent")]
    MessageSent(MessageAck),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub user_id: String,
    pub socket_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ErrorPayload {
    pub fn from_error(err: &ChatError, client_id: Option<String>) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            client_id,
        }
    }
}

// --- Encoding helpers ---

/// Decode a text frame into a client event.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, ChatError> {
    serde_json::from_str(text).map_err(|e| ChatError::Malformed(e.to_string()))
}

/// Encode a server event as a text frame.
pub fn encode_server_event(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Encode and queue an event on one connection.
pub fn send_event(handle: &ConnectionHandle, event: &ServerEvent) -> bool {
    encode_server_event(event)
        .map(|msg| handle.send(msg))
        .unwrap_or(false)
}

/// Send an error event to the originating connection only.
pub fn send_error(handle: &ConnectionHandle, err: &ChatError, client_id: Option<String>) {
    send_event(handle, &ServerEvent::Error(ErrorPayload::from_error(err, client_id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Origin;

    #[test]
    fn test_decode_send_message() {
        let event = decode_client_event(r#"{"event":"send-message","data":{"text":"hello"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage(SendMessagePayload {
                text: "hello".into(),
                receiver: None,
                id: None,
            })
        );
    }

    #[test]
    fn test_decode_admin_message() {
        let event = decode_client_event(
            r#"{"event":"admin-message-sent","data":{"sender":"admin","receiver":"cust-1","text":"we shipped it","id":"local-7"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::AdminMessageSent(p) => {
                assert_eq!(p.receiver, "cust-1");
                assert_eq!(p.id.as_deref(), Some("local-7"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_history_request_and_alias() {
        let legacy = decode_client_event(r#"{"event":"seleted-user-messages","data":{"senderId":"cust-1"}}"#).unwrap();
        let alias = decode_client_event(r#"{"event":"request-history","data":{"senderId":"cust-1"}}"#).unwrap();
        assert_eq!(legacy, alias);
    }

    #[test]
    fn test_decode_rejects_missing_text() {
        let err = decode_client_event(r#"{"event":"send-message","data":{}}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_decode_rejects_non_string_text() {
        let err = decode_client_event(r#"{"event":"send-message","data":{"text":42}}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        assert!(decode_client_event(r#"{"event":"nope","data":{}}"#).is_err());
        assert!(decode_client_event("not json").is_err());
    }

    #[test]
    fn test_receive_message_wire_shape() {
        let event = ServerEvent::ReceiveMessage(Message {
            id: "m1".into(),
            sender_id: "cust-1".into(),
            receiver_id: Some("admin".into()),
            text: "hello".into(),
            origin: Origin::User,
            timestamp: 1_700_000_000_000,
            is_read: false,
        });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "receive-message");
        assert_eq!(json["data"]["senderId"], "cust-1");
        assert_eq!(json["data"]["receiverId"], "admin");
        assert_eq!(json["data"]["from"], "user");
        assert_eq!(json["data"]["isRead"], false);
    }

    #[test]
    fn test_active_users_wire_shape() {
        let id = ConnectionId::new();
        let event = ServerEvent::ActiveUsers(vec![ActiveUser {
            user_id: "cust-1".into(),
            socket_id: id,
        }]);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "active-users");
        assert_eq!(json["data"][0]["userId"], "cust-1");
        assert_eq!(json["data"][0]["socketId"], id.to_string());
    }
}
