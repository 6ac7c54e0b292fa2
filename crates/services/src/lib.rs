//! services
//!
//! Application logic over the domain ports: contact resolution,
//! conversations and presence. Stores are injected, never global.

pub mod contacts;
pub mod conversations;
pub mod presence;

use std::sync::Arc;

use domains::{DirectoryRepository, MessageRepository, PresenceRepository};

pub use contacts::ContactResolver;
pub use conversations::{ConversationService, SendMessage};
pub use presence::PresenceService;

/// All services, wired against the same set of stores.
#[derive(Clone)]
pub struct Services {
    pub contacts: Arc<ContactResolver>,
    pub conversations: Arc<ConversationService>,
    pub presence: Arc<PresenceService>,
}

impl Services {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        messages: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRepository>,
    ) -> Self {
        Self {
            contacts: Arc::new(ContactResolver::new(directory.clone(), messages.clone())),
            conversations: Arc::new(ConversationService::new(directory.clone(), messages)),
            presence: Arc::new(PresenceService::new(directory, presence)),
        }
    }

    /// Wires every port to one store implementing all of them.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DirectoryRepository + MessageRepository + PresenceRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }
}
