//! Room membership
//!
//! A room is a named fan-out group. Rooms are created lazily on first join
//! and dropped when their subscriber set empties; join and leave are both
//! idempotent. Room identifiers are typed rather than formatted strings.

use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;

use super::registry::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Personal channel, joined automatically at registration; targeted
    /// notifications reach the user regardless of open conversation screens.
    User(String),
    /// Joined explicitly by clients viewing that conversation.
    Conversation(String),
}

impl RoomId {
    pub fn user(id: impl Into<String>) -> Self {
        RoomId::User(id.into())
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        RoomId::Conversation(id.into())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::User(id) => write!(f, "user:{id}"),
            RoomId::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    /// Reverse index so a disconnecting connection can leave everything.
    joined: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, connection_id: ConnectionId, room: RoomId) {
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(connection_id);
        self.joined.entry(connection_id).or_default().insert(room);
    }

    pub fn leave(&self, connection_id: ConnectionId, room: &RoomId) {
        if let Some(mut subscribers) = self.rooms.get_mut(room) {
            subscribers.remove(&connection_id);
            let empty = subscribers.is_empty();
            drop(subscribers);
            if empty {
                self.rooms.remove_if(room, |_, subs| subs.is_empty());
            }
        }
        if let Some(mut joined) = self.joined.get_mut(&connection_id) {
            joined.remove(room);
        }
    }

    /// Remove the connection from every room it joined, for unregistration.
    pub fn leave_all(&self, connection_id: ConnectionId) {
        let rooms = self
            .joined
            .remove(&connection_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default();
        for room in rooms {
            if let Some(mut subscribers) = self.rooms.get_mut(&room) {
                subscribers.remove(&connection_id);
                let empty = subscribers.is_empty();
                drop(subscribers);
                if empty {
                    self.rooms.remove_if(&room, |_, subs| subs.is_empty());
                }
            }
        }
    }

    /// Snapshot of the current subscriber set.
    pub fn subscribers_of(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
