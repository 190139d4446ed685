//! Connection registry
//!
//! In-memory index of live connections: connection id → outbound handle,
//! plus user id → connection set for multi-device fan-out. The index has no
//! persistent identity; it is rebuilt empty on process restart.

use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound side of a live connection. Sends are fire-and-forget: a closed
/// receiver means the socket is being torn down and will unregister itself.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: String,
    pub authenticated_at: i64,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(
        user_id: String,
        authenticated_at: i64,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            authenticated_at,
            sender,
        }
    }

    /// Queue an event for delivery; returns false if the connection is dead.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    by_user: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns the user's connection count after insertion,
    /// so the caller can detect the offline→online transition (count == 1).
    pub fn insert(&self, handle: Arc<ConnectionHandle>) -> usize {
        let mut set = self.by_user.entry(handle.user_id.clone()).or_default();
        set.insert(handle.id);
        let count = set.len();
        drop(set);
        self.connections.insert(handle.id, handle);
        count
    }

    /// Remove a connection. Returns the handle and the user's remaining
    /// connection count (0 means this was the last device).
    pub fn remove(&self, id: ConnectionId) -> Option<(Arc<ConnectionHandle>, usize)> {
        let (_, handle) = self.connections.remove(&id)?;
        let mut remaining = 0;
        if let Some(mut set) = self.by_user.get_mut(&handle.user_id) {
            set.remove(&id);
            remaining = set.len();
        }
        if remaining == 0 {
            self.by_user
                .remove_if(&handle.user_id, |_, set| set.is_empty());
        }
        Some((handle, remaining))
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|h| h.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map(|s| s.len()).unwrap_or(0)
    }
}
