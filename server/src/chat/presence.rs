//! Server-side presence tracking.
//!
//! One process-wide registry of live connections, keyed both by connection
//! and by user. Presence is never persisted: after a restart every user is
//! offline until they reconnect. Running several server processes would
//! fragment presence; that is a known limitation of this design.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::db::models::Origin;
use crate::state::ChatState;
use crate::ws::{ConnectionHandle, ConnectionId};

/// Role of a connected party, decided by whoever performs the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// Origin tag recorded on messages authored under this role.
    pub fn origin(&self) -> Origin {
        match self {
            Self::Admin => Origin::Admin,
            Self::User => Origin::User,
        }
    }
}

/// One live connection's binding to a user.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub user_id: String,
    pub role: Role,
    pub handle: ConnectionHandle,
    /// Registration order, used to keep listings stable
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    by_connection: HashMap<ConnectionId, PresenceEntry>,
    by_user: HashMap<String, Vec<ConnectionId>>,
    next_seq: u64,
}

impl RegistryInner {
    fn detach(&mut self, id: &ConnectionId) -> Option<PresenceEntry> {
        let entry = self.by_connection.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&entry.user_id) {
            ids.retain(|c| c != id);
            if ids.is_empty() {
                self.by_user.remove(&entry.user_id);
            }
        }
        Some(entry)
    }
}

/// Who is online, on which connections, right now.
///
/// Both indexes live behind a single mutex so register, unregister and the
/// queries never observe a half-applied update. The lock is never held
/// across an await.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Every mutation completes without panicking, so a poisoned map is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a connection to a user. Re-registering the same connection
    /// replaces its previous binding instead of duplicating it.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle, role: Role) {
        let mut inner = self.lock();
        let id = handle.id;
        inner.detach(&id);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_connection.insert(
            id,
            PresenceEntry {
                user_id: user_id.to_string(),
                role,
                handle,
                seq,
            },
        );
        inner.by_user.entry(user_id.to_string()).or_default().push(id);

        tracing::debug!(
            user_id = %user_id,
            connection_id = %id,
            role = role.as_str(),
            connections = inner.by_user.get(user_id).map(|v| v.len()).unwrap_or(0),
            "Connection registered"
        );
    }

    /// Remove the binding for a connection. Safe to call any number of times.
    pub fn unregister(&self, id: &ConnectionId) -> Option<PresenceEntry> {
        let removed = self.lock().detach(id);
        if let Some(entry) = &removed {
            tracing::debug!(
                user_id = %entry.user_id,
                connection_id = %id,
                "Connection unregistered"
            );
        }
        removed
    }

    /// The entry bound to a connection, if any.
    pub fn lookup(&self, id: &ConnectionId) -> Option<PresenceEntry> {
        self.lock().by_connection.get(id).cloned()
    }

    /// Live handles for a user; empty when the user is offline.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        let inner = self.lock();
        inner
            .by_user
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.by_connection.get(id))
                    .map(|entry| entry.handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every live (user id, handle) pair with the given role, in registration order.
    pub fn list_by_role(&self, role: Role) -> Vec<(String, ConnectionHandle)> {
        let inner = self.lock();
        let mut entries: Vec<&PresenceEntry> = inner
            .by_connection
            .values()
            .filter(|entry| entry.role == role)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| (entry.user_id.clone(), entry.handle.clone()))
            .collect()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.lock().by_user.contains_key(user_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().by_connection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// --- REST endpoint ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub admins: Vec<String>,
    pub users: Vec<String>,
    pub connections: usize,
}

fn distinct_users(entries: Vec<(String, ConnectionHandle)>) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for (user_id, _) in entries {
        if !users.contains(&user_id) {
            users.push(user_id);
        }
    }
    users
}

/// GET /api/presence: distinct online admins and customers.
pub async fn get_presence(State(state): State<ChatState>) -> Json<PresenceResponse> {
    let registry = &state.registry;
    Json(PresenceResponse {
        admins: distinct_users(registry.list_by_role(Role::Admin)),
        users: distinct_users(registry.list_by_role(Role::User)),
        connections: registry.len(),
    })
}
