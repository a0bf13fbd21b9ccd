//! Conversation routing for `send` events.
//!
//! Customers talk to a shared admin inbox: every customer message is stored
//! against the admin sentinel id and fanned out to all live admin
//! connections. Admin replies are stored under the sentinel as sender and
//! delivered to every live connection of the addressed customer. Per-agent
//! assignment, if ever needed, belongs in `plan_route`.

use crate::chat::presence::{PresenceEntry, PresenceRegistry, Role};
use crate::db::models::{Message, NewMessage};
use crate::error::ChatError;
use crate::state::ChatState;
use crate::ws::broadcast::send_to_handles;
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionHandle, ConnectionId};

/// A `send` as issued by one connection. The sender is never part of the
/// request: it is resolved from the connection's presence entry.
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub text: String,
    pub recipient: Option<String>,
    /// Client-side id echoed in the acknowledgement
    pub client_id: Option<String>,
}

/// Outcome of a routed send.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    /// Recipient connections that accepted the `receive-message` frame
    pub delivered: usize,
    /// Sender-side connections (other tabs) that got the echo
    pub echoed: usize,
}

/// Who should see a message live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every live admin connection.
    Admins,
    /// Every live connection of one user.
    User(String),
}

/// Storage keys and live audience for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub sender_key: String,
    pub receiver_key: String,
    pub audience: Audience,
}

/// Trim and bound the message body.
pub fn validate_text(text: &str, max_len: usize) -> Result<String, ChatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::Validation("message text must not be empty".into()));
    }
    if text.chars().count() > max_len {
        return Err(ChatError::Validation(format!(
            "message text exceeds {} characters",
            max_len
        )));
    }
    Ok(text.to_string())
}

/// Decide storage keys and audience from the sender's role and optional recipient.
pub fn plan_route(
    sender: &PresenceEntry,
    recipient: Option<&str>,
    admin_id: &str,
) -> Result<RoutePlan, ChatError> {
    let recipient = recipient.map(str::trim).filter(|r| !r.is_empty());

    match sender.role {
        Role::User => match recipient {
            None => Ok(RoutePlan {
                sender_key: sender.user_id.clone(),
                receiver_key: admin_id.to_string(),
                audience: Audience::Admins,
            }),
            Some(r) if r == admin_id => Ok(RoutePlan {
                sender_key: sender.user_id.clone(),
                receiver_key: admin_id.to_string(),
                audience: Audience::Admins,
            }),
            Some(_) => Err(ChatError::Validation(
                "customers can only message the support inbox".into(),
            )),
        },
        Role::Admin => {
            let receiver = recipient.ok_or_else(|| {
                ChatError::Validation("admin messages require a receiver".into())
            })?;
            if receiver == admin_id {
                return Err(ChatError::Validation(
                    "admin messages must be addressed to a customer".into(),
                ));
            }
            Ok(RoutePlan {
                sender_key: admin_id.to_string(),
                receiver_key: receiver.to_string(),
                audience: Audience::User(receiver.to_string()),
            })
        }
    }
}

/// Live handles for an audience, minus the originating connection.
pub fn resolve_audience(
    registry: &PresenceRegistry,
    audience: &Audience,
    origin: &ConnectionId,
) -> Vec<ConnectionHandle> {
    let handles: Vec<ConnectionHandle> = match audience {
        Audience::Admins => registry
            .list_by_role(Role::Admin)
            .into_iter()
            .map(|(_, handle)| handle)
            .collect(),
        Audience::User(user_id) => registry.connections_for(user_id),
    };
    handles.into_iter().filter(|h| h.id != *origin).collect()
}

/// Sender-side connections that should mirror the message: the sender's
/// other tabs, or for admins every other admin connection, since admins
/// share one inbox identity.
fn echo_targets(
    registry: &PresenceRegistry,
    sender: &PresenceEntry,
    origin: &ConnectionId,
    already: &[ConnectionHandle],
) -> Vec<ConnectionHandle> {
    let candidates = match sender.role {
        Role::Admin => resolve_audience(registry, &Audience::Admins, origin),
        Role::User => resolve_audience(registry, &Audience::User(sender.user_id.clone()), origin),
    };
    candidates
        .into_iter()
        .filter(|h| !already.iter().any(|a| a.id == h.id))
        .collect()
}

/// Route one `send`: validate, persist, then fan out.
///
/// The write completes before any frame is queued, so a message that
/// reaches a recipient is always retrievable from history. The audience is
/// resolved after the write; a recipient that disconnects in between simply
/// misses this delivery and picks the message up from history later.
pub async fn route_send(
    state: &ChatState,
    origin: &ConnectionId,
    request: SendRequest,
) -> Result<Delivery, ChatError> {
    let text = validate_text(&request.text, state.chat.max_text_length)?;
    let sender = state
        .registry
        .lookup(origin)
        .ok_or(ChatError::Unauthenticated)?;
    let plan = plan_route(&sender, request.recipient.as_deref(), &state.chat.admin_id)?;

    let message = state
        .store
        .append(NewMessage {
            sender_id: plan.sender_key.clone(),
            receiver_id: Some(plan.receiver_key.clone()),
            text,
            origin: sender.role.origin(),
        })
        .await?;

    let event = ServerEvent::ReceiveMessage(message.clone());

    let audience = resolve_audience(&state.registry, &plan.audience, origin);
    let delivered = send_to_handles(&audience, &event);

    let echo = echo_targets(&state.registry, &sender, origin, &audience);
    let echoed = send_to_handles(&echo, &event);

    tracing::info!(
        message_id = %message.id,
        user_id = %sender.user_id,
        role = sender.role.as_str(),
        receiver = %plan.receiver_key,
        delivered,
        echoed,
        "Message routed"
    );

    if delivered == 0 {
        tracing::debug!(
            message_id = %message.id,
            receiver = %plan.receiver_key,
            "No live recipient connections, message kept for history"
        );
    }

    Ok(Delivery {
        message,
        delivered,
        echoed,
    })
}
