use crate::chat::presence::{PresenceRegistry, Role};
use crate::ws::protocol::{encode_server_event, ServerEvent};
use crate::ws::ConnectionHandle;

/// Encode once and queue on every handle. Returns how many handles accepted
/// the frame; a closed handle is a dropped delivery, not an error.
pub fn send_to_handles<'a, I>(handles: I, event: &ServerEvent) -> usize
where
    I: IntoIterator<Item = &'a ConnectionHandle>,
{
    let Some(msg) = encode_server_event(event) else {
        return 0;
    };

    handles
        .into_iter()
        .filter(|handle| handle.send(msg.clone()))
        .count()
}

/// Send an event to every live connection with the given role.
pub fn send_to_role(registry: &PresenceRegistry, role: Role, event: &ServerEvent) -> usize {
    let handles: Vec<ConnectionHandle> = registry
        .list_by_role(role)
        .into_iter()
        .map(|(_, handle)| handle)
        .collect();
    send_to_handles(&handles, event)
}
