//! Event dispatcher
//!
//! Fan-out engine: given a room, deliver a typed event to every connection
//! subscribed at call time. Delivery is fire-and-forget onto each
//! connection's outbound queue; failures to reach a dead connection are
//! swallowed (the registry reaps it on its own disconnect detection) and
//! never propagate back to the caller. Per room, events are queued to each
//! subscriber in emission order; there is no cross-room ordering.

use std::sync::Arc;
use tracing::debug;

use super::events::ServerEvent;
use super::registry::{ConnectionId, ConnectionRegistry};
use super::rooms::{RoomId, RoomRegistry};

#[derive(Clone)]
pub struct EventDispatcher {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
}

impl EventDispatcher {
    pub fn new(connections: Arc<ConnectionRegistry>, rooms: Arc<RoomRegistry>) -> Self {
        Self { connections, rooms }
    }

    pub fn emit_to_room(&self, room: &RoomId, event: ServerEvent) {
        self.emit(room, None, event);
    }

    /// Same as [`Self::emit_to_room`] but skips one connection; used for
    /// typing indicators, which the originating socket must not echo back.
    pub fn emit_to_room_except(&self, room: &RoomId, except: ConnectionId, event: ServerEvent) {
        self.emit(room, Some(except), event);
    }

    pub fn emit_to_user(&self, user_id: &str, event: ServerEvent) {
        self.emit_to_room(&RoomId::user(user_id), event);
    }

    pub fn emit_to_conversation(&self, conversation_id: &str, event: ServerEvent) {
        self.emit_to_room(&RoomId::conversation(conversation_id), event);
    }

    fn emit(&self, room: &RoomId, except: Option<ConnectionId>, event: ServerEvent) {
        let subscribers = self.rooms.subscribers_of(room);
        metrics::counter!("ws_events_emitted_total", 1, "event" => event.name());
        let mut delivered = 0usize;
        for connection_id in subscribers {
            if Some(connection_id) == except {
                continue;
            }
            let Some(handle) = self.connections.get(connection_id) else {
                continue;
            };
            if handle.send(event.clone()) {
                delivered += 1;
            } else {
                // Dead socket; the connection task unregisters itself.
                debug!(%connection_id, room = %room, "dropping event for dead connection");
            }
        }
        debug!(room = %room, event = event.name(), delivered, "event dispatched");
    }
}
