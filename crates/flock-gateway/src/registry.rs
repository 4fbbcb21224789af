use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use uuid::Uuid;

use flock_types::Id;
use flock_types::events::GatewayEvent;

pub type ConnectionId = Uuid;

/// A direct-message conversation, independent of who wrote first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey(Id, Id);

impl ConversationKey {
    pub fn between(a: Id, b: Id) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }

    pub fn includes(&self, user_id: Id) -> bool {
        self.0 == user_id || self.1 == user_id
    }
}

struct Member {
    user_id: Id,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    conversations: HashSet<ConversationKey>,
}

/// Live connection membership: identity rooms and, inside them, the
/// conversation sub-rooms each connection has joined.
///
/// Holds no locks and does no I/O; the [`Dispatcher`](crate::dispatcher::Dispatcher)
/// owns one behind an `RwLock`.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Member>,
    rooms: HashMap<Id, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to `user_id`'s room. Several connections per user are fine.
    pub fn join(&mut self, user_id: Id, tx: mpsc::UnboundedSender<GatewayEvent>) -> ConnectionId {
        let conn_id = Uuid::new_v4();
        self.connections.insert(
            conn_id,
            Member {
                user_id,
                tx,
                conversations: HashSet::new(),
            },
        );
        self.rooms.entry(user_id).or_default().insert(conn_id);
        conn_id
    }

    /// Remove a connection from its room and every conversation. Returns the
    /// identity it was bound to.
    pub fn leave(&mut self, conn_id: ConnectionId) -> Option<Id> {
        let member = self.connections.remove(&conn_id)?;
        if let Some(room) = self.rooms.get_mut(&member.user_id) {
            room.remove(&conn_id);
            if room.is_empty() {
                self.rooms.remove(&member.user_id);
            }
        }
        Some(member.user_id)
    }

    pub fn members_of(&self, user_id: Id) -> Vec<ConnectionId> {
        self.rooms
            .get(&user_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn identity_of(&self, conn_id: ConnectionId) -> Option<Id> {
        self.connections.get(&conn_id).map(|m| m.user_id)
    }

    /// Join the conversation between this connection's user and `peer`.
    pub fn join_conversation(&mut self, conn_id: ConnectionId, peer: Id) -> Option<ConversationKey> {
        let member = self.connections.get_mut(&conn_id)?;
        let key = ConversationKey::between(member.user_id, peer);
        member.conversations.insert(key);
        Some(key)
    }

    pub fn leave_conversation(&mut self, conn_id: ConnectionId, peer: Id) -> bool {
        match self.connections.get_mut(&conn_id) {
            Some(member) => {
                let key = ConversationKey::between(member.user_id, peer);
                member.conversations.remove(&key)
            }
            None => false,
        }
    }

    /// Connections of `user_id` that joined `key`.
    pub fn conversation_members(&self, user_id: Id, key: ConversationKey) -> Vec<ConnectionId> {
        self.rooms
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter(|conn_id| {
                self.connections
                    .get(conn_id)
                    .is_some_and(|m| m.conversations.contains(&key))
            })
            .copied()
            .collect()
    }

    /// Hand `event` to each listed connection. Returns how many accepted it.
    pub fn deliver(&self, targets: &[ConnectionId], event: &GatewayEvent) -> usize {
        targets
            .iter()
            .filter_map(|conn_id| self.connections.get(conn_id))
            .filter(|member| member.tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
