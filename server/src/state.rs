use std::sync::Arc;

use crate::chat::presence::PresenceRegistry;
use crate::chat::store::MessageStore;
use crate::config::ChatConfig;

/// Shared application state passed to all handlers via axum State extractor.
/// Built once by the composition root; nothing in the chat core reaches for
/// a global.
#[derive(Clone)]
pub struct ChatState {
    /// Live connections per user, process-local
    pub registry: Arc<PresenceRegistry>,
    /// Durable message log
    pub store: Arc<dyn MessageStore>,
    /// Routing and heartbeat settings
    pub chat: Arc<ChatConfig>,
}

impl ChatState {
    pub fn new(store: Arc<dyn MessageStore>, chat: ChatConfig) -> Self {
        Self {
            registry: Arc::new(PresenceRegistry::new()),
            store,
            chat: Arc::new(chat),
        }
    }
}
