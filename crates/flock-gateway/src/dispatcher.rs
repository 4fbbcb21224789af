use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

use flock_types::Id;
use flock_types::events::GatewayEvent;

use crate::registry::{ConnectionId, ConnectionRegistry, ConversationKey};

/// Publishing found nobody to deliver to. The event is already persisted,
/// so callers log this and carry on.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("user {0} has no live connections")]
    NoLiveConnections(Id),

    #[error("user {user_id} has no connection in conversation with {peer}")]
    NotInConversation { user_id: Id, peer: Id },
}

/// Identity-scoped pub/sub over the live connections of this process.
///
/// Delivery is at-most-once and best effort: nothing is queued for users
/// who are offline.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<RwLock<ConnectionRegistry>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `user_id`'s room. Events for it arrive on the returned receiver.
    pub async fn connect(&self, user_id: Id) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.registry.write().await.join(user_id, tx);
        (conn_id, rx)
    }

    pub async fn disconnect(&self, conn_id: ConnectionId) {
        self.registry.write().await.leave(conn_id);
    }

    pub async fn join_conversation(&self, conn_id: ConnectionId, peer: Id) -> Option<ConversationKey> {
        self.registry.write().await.join_conversation(conn_id, peer)
    }

    pub async fn leave_conversation(&self, conn_id: ConnectionId, peer: Id) -> bool {
        self.registry.write().await.leave_conversation(conn_id, peer)
    }

    /// Fan `event` out to every connection in `recipient`'s room.
    pub async fn publish(&self, recipient: Id, event: GatewayEvent) -> Result<usize, DeliveryError> {
        let registry = self.registry.read().await;
        let targets = registry.members_of(recipient);
        match registry.deliver(&targets, &event) {
            0 => Err(DeliveryError::NoLiveConnections(recipient)),
            n => Ok(n),
        }
    }

    /// Deliver to `receiver`'s connections that joined the conversation with `sender`.
    pub async fn publish_to_conversation(
        &self,
        receiver: Id,
        sender: Id,
        event: GatewayEvent,
    ) -> Result<usize, DeliveryError> {
        let registry = self.registry.read().await;
        let targets = registry.conversation_members(receiver, ConversationKey::between(receiver, sender));
        match registry.deliver(&targets, &event) {
            0 => Err(DeliveryError::NotInConversation { user_id: receiver, peer: sender }),
            n => Ok(n),
        }
    }

    pub async fn live_connections(&self, user_id: Id) -> usize {
        self.registry.read().await.members_of(user_id).len()
    }
}
