//! WebSocket broadcast helpers for presence events.
//! Wraps presence snapshots in server events and pushes them to admin connections.

use crate::chat::presence::{PresenceRegistry, Role};
use crate::ws::broadcast::send_to_role;
use crate::ws::protocol::{send_event, ActiveUser, ServerEvent};
use crate::ws::ConnectionHandle;

/// Current customer connections, one entry per socket.
pub fn active_users(registry: &PresenceRegistry) -> Vec<ActiveUser> {
    registry
        .list_by_role(Role::User)
        .into_iter()
        .map(|(user_id, handle)| ActiveUser {
            user_id,
            socket_id: handle.id,
        })
        .collect()
}

/// Push the customer presence snapshot to every admin connection.
pub fn broadcast_active_users(registry: &PresenceRegistry) {
    let event = ServerEvent::ActiveUsers(active_users(registry));
    let reached = send_to_role(registry, Role::Admin, &event);
    tracing::debug!(admins = reached, "Broadcast active-users snapshot");
}

/// Send the customer presence snapshot to a single (admin) connection.
pub fn send_active_users(registry: &PresenceRegistry, handle: &ConnectionHandle) {
    send_event(handle, &ServerEvent::ActiveUsers(active_users(registry)));
}
