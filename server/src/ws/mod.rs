pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod session;

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system clone the handle to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Server-assigned identifier for one live socket. Surfaces on the wire as `socketId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to one live connection: its id plus the outbound queue
/// drained by the connection's writer task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: ConnectionSender) -> Self {
        Self { id, tx }
    }

    /// Queue a frame. Returns false when the connection's writer is gone,
    /// which callers treat as a dropped delivery rather than an error.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Create a handle with a fresh id and the receiving end of its queue.
/// The actor owns the receiver; tests read from it directly.
pub fn new_connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(ConnectionId::new(), tx), rx)
}
