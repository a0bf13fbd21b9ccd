//! Row and domain types for the chat schema.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which role authored a message. Stored independently of the sender id so
/// admin-authored rows stay recognizable whatever the admin identifier is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Admin,
    User,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted chat message (one row of the messages table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
    pub text: String,
    #[serde(rename = "from")]
    pub origin: Origin,
    /// Unix millis, strictly increasing per store
    pub timestamp: i64,
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Whether this message belongs to the conversation {a, b}.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        let receiver = self.receiver_id.as_deref();
        (self.sender_id == a && receiver == Some(b)) || (self.sender_id == b && receiver == Some(a))
    }
}

/// Input for an append; id, timestamp and read flag are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub text: String,
    pub origin: Origin,
}
