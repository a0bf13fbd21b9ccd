use std::collections::BTreeMap;

use crate::chat::presence::Role;
use crate::db::models::{Message, Origin};
use crate::ws::protocol::{
    ActiveUser, AdminMessagePayload, ClientEvent, HistoryRequestPayload, SendMessagePayload,
    ServerEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Sent locally, not yet acknowledged
    Pending,
    Confirmed,
    /// Rejected or not persisted by the server
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Server id once confirmed, local id before that
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub origin: Origin,
    pub timestamp: Option<i64>,
    pub status: EntryStatus,
}

impl TranscriptEntry {
    fn confirmed(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            origin: message.origin,
            timestamp: Some(message.timestamp),
            status: EntryStatus::Confirmed,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    LocalSend { local_id: String, text: String },
    HistoryReceived(Vec<Message>),
    MessageReceived(Message),
    SendAcknowledged { client_id: Option<String>, message: Message },
    SendFailed { client_id: Option<String>, reason: String },
    PresenceUpdated(Vec<ActiveUser>),
}

/// Local view of one conversation.
///
/// `self_key` is how this side appears in stored messages (the customer's
/// id, or the admin sentinel for the dashboard); `peer` is the other
/// participant. Confirmed messages are kept sorted by server timestamp and
/// unique by id, so replayed history and live deliveries can arrive in any
/// order without duplicating lines.
#[derive(Debug, Clone)]
pub struct ChatSession {
    self_key: String,
    peer: String,
    role: Role,
    confirmed: Vec<TranscriptEntry>,
    /// (local id, entry) in send order
    outbox: Vec<(String, TranscriptEntry)>,
    /// Messages from other conversations, counted by counterpart
    unseen: BTreeMap<String, usize>,
    active_users: Vec<ActiveUser>,
    last_error: Option<String>,
}

impl ChatSession {
    /// Customer widget: talks to the shared admin inbox.
    pub fn customer(user_id: &str, admin_id: &str) -> Self {
        Self::new(user_id, admin_id, Role::User)
    }

    /// Admin dashboard with one customer selected.
    pub fn admin(admin_id: &str, customer_id: &str) -> Self {
        Self::new(admin_id, customer_id, Role::Admin)
    }

    fn new(self_key: &str, peer: &str, role: Role) -> Self {
        Self {
            self_key: self_key.to_string(),
            peer: peer.to_string(),
            role,
            confirmed: Vec::new(),
            outbox: Vec::new(),
            unseen: BTreeMap::new(),
            active_users: Vec::new(),
            last_error: None,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Confirmed messages in timestamp order, then unconfirmed local sends.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.confirmed
            .iter()
            .cloned()
            .chain(self.outbox.iter().map(|(_, e)| e.clone()))
            .collect()
    }

    pub fn active_users(&self) -> &[ActiveUser] {
        &self.active_users
    }

    pub fn unseen(&self) -> &BTreeMap<String, usize> {
        &self.unseen
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Build the outbound event for a send and record it as pending.
    pub fn compose_send(&mut self, text: &str) -> ClientEvent {
        let local_id = uuid::Uuid::new_v4().to_string();
        self.reduce(Action::LocalSend {
            local_id: local_id.clone(),
            text: text.to_string(),
        });

        match self.role {
            Role::User => ClientEvent::SendMessage(SendMessagePayload {
                text: text.to_string(),
                receiver: None,
                id: Some(local_id),
            }),
            Role::Admin => ClientEvent::AdminMessageSent(AdminMessagePayload {
                sender: Some(self.self_key.clone()),
                receiver: self.peer.clone(),
                text: text.to_string(),
                id: Some(local_id),
            }),
        }
    }

    /// The history request to issue after (re)connecting.
    pub fn history_request(&self) -> ClientEvent {
        ClientEvent::RequestHistory(HistoryRequestPayload {
            sender_id: self.peer.clone(),
        })
    }

    /// Translate a server event into an action and apply it.
    pub fn apply_server_event(&mut self, event: ServerEvent) {
        let action = match event {
            ServerEvent::ActiveUsers(users) => Action::PresenceUpdated(users),
            ServerEvent::PreviousMessages(messages) => Action::HistoryReceived(messages),
            ServerEvent::ReceiveMessage(message) => Action::MessageReceived(message),
            ServerEvent::MessageSent(ack) => Action::SendAcknowledged {
                client_id: ack.client_id,
                message: ack.message,
            },
            ServerEvent::Error(err) => Action::SendFailed {
                client_id: err.client_id,
                reason: err.message,
            },
        };
        self.reduce(action);
    }

    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::LocalSend { local_id, text } => {
                let entry = TranscriptEntry {
                    id: local_id.clone(),
                    sender_id: self.self_key.clone(),
                    text,
                    origin: self.role.origin(),
                    timestamp: None,
                    status: EntryStatus::Pending,
                };
                self.outbox.push((local_id, entry));
            }
            Action::HistoryReceived(messages) => {
                for message in &messages {
                    self.upsert(message);
                }
            }
            Action::MessageReceived(message) => {
                self.upsert(&message);
            }
            Action::SendAcknowledged { client_id, message } => {
                if let Some(client_id) = client_id {
                    self.outbox.retain(|(local, _)| *local != client_id);
                }
                self.upsert(&message);
            }
            Action::SendFailed { client_id, reason } => {
                let target = match &client_id {
                    Some(id) => self.outbox.iter_mut().find(|(local, _)| local == id),
                    None => None,
                };
                if let Some((_, entry)) = target {
                    entry.status = EntryStatus::Failed;
                }
                self.last_error = Some(reason);
            }
            Action::PresenceUpdated(users) => {
                self.active_users = users;
            }
        }
    }

    fn upsert(&mut self, message: &Message) {
        if !message.is_between(&self.self_key, &self.peer) {
            let counterpart = if message.sender_id == self.self_key {
                message.receiver_id.clone().unwrap_or_default()
            } else {
                message.sender_id.clone()
            };
            *self.unseen.entry(counterpart).or_default() += 1;
            return;
        }

        let entry = TranscriptEntry::confirmed(message);
        match self.confirmed.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => {
                let pos = self
                    .confirmed
                    .partition_point(|e| (e.timestamp, &e.id) <= (entry.timestamp, &entry.id));
                self.confirmed.insert(pos, entry);
            }
        }
    }
}
