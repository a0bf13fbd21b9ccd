//! Per-connection event dispatcher.
//!
//! Every inbound event, whether decoded from a frame or synthesized by the
//! actor (handshake at upgrade, disconnect at teardown), goes through
//! `ConnectionSession::dispatch`. Errors stay local to the connection: they
//! are reported back as an `error` event and never propagate further.

use crate::chat::broadcast::{broadcast_active_users, send_active_users};
use crate::chat::presence::Role;
use crate::chat::router::{self, SendRequest};
use crate::error::ChatError;
use crate::state::ChatState;
use crate::ws::protocol::{self, ClientEvent, MessageAck, ServerEvent};
use crate::ws::ConnectionHandle;

/// Longest identity claim accepted at handshake.
const MAX_CLAIM_LENGTH: usize = 256;

/// Inbound events, after decoding.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Identity binding at connection start. `claim` comes from the
    /// already-authenticated caller; `role` from the route it connected on.
    Handshake { claim: Option<String>, role: Role },
    RequestHistory { other_party: String },
    Send(SendRequest),
    MarkRead { id: String },
    /// Transport closed, cleanly or not.
    Disconnect,
}

impl From<ClientEvent> for InboundEvent {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::SendMessage(p) => Self::Send(SendRequest {
                text: p.text,
                recipient: p.receiver,
                client_id: p.id,
            }),
            ClientEvent::AdminMessageSent(p) => Self::Send(SendRequest {
                text: p.text,
                recipient: Some(p.receiver),
                client_id: p.id,
            }),
            ClientEvent::RequestHistory(p) => Self::RequestHistory {
                other_party: p.sender_id,
            },
            ClientEvent::MarkRead(p) => Self::MarkRead { id: p.id },
        }
    }
}

/// Accept a claim only if it is a usable identifier.
fn normalize_claim(claim: Option<&str>) -> Option<String> {
    let claim = claim?.trim();
    if claim.is_empty()
        || claim.len() > MAX_CLAIM_LENGTH
        || claim.chars().any(|c| c.is_control())
    {
        return None;
    }
    Some(claim.to_string())
}

#[derive(Debug, Clone)]
struct Identity {
    user_id: String,
    role: Role,
}

/// State machine for one connection: anonymous until a handshake binds an
/// identity, unbound again after disconnect.
pub struct ConnectionSession {
    state: ChatState,
    handle: ConnectionHandle,
    identity: Option<Identity>,
}

impl ConnectionSession {
    pub fn new(state: ChatState, handle: ConnectionHandle) -> Self {
        Self {
            state,
            handle,
            identity: None,
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_id.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|i| i.role)
    }

    /// Decode a text frame and dispatch it. Undecodable frames are answered
    /// with a `malformed` error and otherwise ignored.
    pub async fn handle_text(&mut self, text: &str) {
        match protocol::decode_client_event(text) {
            Ok(event) => self.dispatch(event.into()).await,
            Err(err) => {
                tracing::debug!(
                    connection_id = %self.handle.id,
                    error = %err,
                    "Dropping malformed event"
                );
                protocol::send_error(&self.handle, &err, None);
            }
        }
    }

    /// Process one inbound event to completion.
    pub async fn dispatch(&mut self, event: InboundEvent) {
        let client_id = match &event {
            InboundEvent::Send(req) => req.client_id.clone(),
            _ => None,
        };

        if let Err(err) = self.process(event).await {
            match &err {
                ChatError::Persistence(_) => tracing::error!(
                    connection_id = %self.handle.id,
                    user_id = ?self.user_id(),
                    error = %err,
                    "Chat event failed"
                ),
                _ => tracing::debug!(
                    connection_id = %self.handle.id,
                    user_id = ?self.user_id(),
                    error = %err,
                    "Chat event rejected"
                ),
            }
            protocol::send_error(&self.handle, &err, client_id);
        }
    }

    async fn process(&mut self, event: InboundEvent) -> Result<(), ChatError> {
        match event {
            InboundEvent::Handshake { claim, role } => {
                self.handshake(claim.as_deref(), role);
                Ok(())
            }
            InboundEvent::RequestHistory { other_party } => self.request_history(&other_party).await,
            InboundEvent::Send(request) => self.send(request).await,
            InboundEvent::MarkRead { id } => self.mark_read(&id).await,
            InboundEvent::Disconnect => {
                self.disconnect();
                Ok(())
            }
        }
    }

    fn handshake(&mut self, claim: Option<&str>, role: Role) {
        let Some(user_id) = normalize_claim(claim) else {
            // Anonymous browsing is allowed; chat events will be refused
            tracing::info!(
                connection_id = %self.handle.id,
                role = role.as_str(),
                "Connection accepted without identity"
            );
            return;
        };

        let registry = &self.state.registry;
        registry.register(&user_id, self.handle.clone(), role);

        tracing::info!(
            connection_id = %self.handle.id,
            user_id = %user_id,
            role = role.as_str(),
            "Connection bound"
        );

        match role {
            Role::Admin => send_active_users(registry, &self.handle),
            Role::User => broadcast_active_users(registry),
        }

        self.identity = Some(Identity { user_id, role });
    }

    async fn request_history(&self, other_party: &str) -> Result<(), ChatError> {
        let identity = self.identity.as_ref().ok_or(ChatError::Unauthenticated)?;
        let other_party = other_party.trim();
        if other_party.is_empty() {
            return Err(ChatError::Validation("history request needs a participant id".into()));
        }

        // Admins read and write the shared inbox under the sentinel id
        let self_key = match identity.role {
            Role::Admin => self.state.chat.admin_id.as_str(),
            Role::User => identity.user_id.as_str(),
        };

        let messages = self.state.store.find_conversation(self_key, other_party).await?;
        tracing::debug!(
            connection_id = %self.handle.id,
            participant = %other_party,
            count = messages.len(),
            "Replaying history"
        );
        protocol::send_event(&self.handle, &ServerEvent::PreviousMessages(messages));
        Ok(())
    }

    async fn send(&self, request: SendRequest) -> Result<(), ChatError> {
        let client_id = request.client_id.clone();
        let delivery = router::route_send(&self.state, &self.handle.id, request).await?;
        protocol::send_event(
            &self.handle,
            &ServerEvent::MessageSent(MessageAck {
                client_id,
                message: delivery.message,
            }),
        );
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ChatError> {
        if self.identity.is_none() {
            return Err(ChatError::Unauthenticated);
        }
        let id = id.trim();
        if id.is_empty() {
            return Err(ChatError::Validation("message id must not be empty".into()));
        }
        self.state.store.mark_read(id).await?;
        Ok(())
    }

    fn disconnect(&mut self) {
        let removed = self.state.registry.unregister(&self.handle.id);
        self.identity = None;

        if let Some(entry) = removed {
            tracing::info!(
                connection_id = %self.handle.id,
                user_id = %entry.user_id,
                still_online = self.state.registry.is_online(&entry.user_id),
                "Connection released"
            );
            if entry.role == Role::User {
                broadcast_active_users(&self.state.registry);
            }
        }
    }
}
