//! Realtime core: connection lifecycle, room membership, presence, and
//! event fan-out.
//!
//! [`Hub`] is the process-wide service bundling the in-memory indexes and
//! their collaborators. It is created once at startup and injected into
//! handlers through application state; there is no ambient global.

pub mod dispatcher;
pub mod events;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod websocket;

pub use dispatcher::EventDispatcher;
pub use events::{ClientMessage, ServerEvent};
pub use presence::PresenceTracker;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use rooms::{RoomId, RoomRegistry};

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    auth::{self, TokenVerifier},
    error::ApiError,
    models::now_millis,
    store::DocumentStore,
};

pub struct Hub {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    dispatcher: EventDispatcher,
    presence: PresenceTracker,
    verifier: Arc<dyn TokenVerifier>,
    store: Arc<dyn DocumentStore>,
    max_connections_per_user: usize,
}

impl Hub {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn TokenVerifier>,
        max_connections_per_user: usize,
    ) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher = EventDispatcher::new(connections.clone(), rooms.clone());
        let presence = PresenceTracker::new(store.clone(), dispatcher.clone());
        Self {
            connections,
            rooms,
            dispatcher,
            presence,
            verifier,
            store,
            max_connections_per_user,
        }
    }

    /// Authenticate a connection and register it.
    ///
    /// Verifies the token, enforces account state (bans, forced logout) and
    /// the per-user connection cap, joins the connection to the user's
    /// personal room, and triggers the online presence transition when this
    /// is the user's first live connection.
    pub async fn register(
        &self,
        token: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Arc<ConnectionHandle>, ApiError> {
        let user = auth::authenticate(self.verifier.as_ref(), self.store.as_ref(), token).await?;

        let handle = Arc::new(ConnectionHandle::new(
            user.user_id.clone(),
            now_millis(),
            sender,
        ));
        let count = self.connections.insert(handle.clone());
        if count > self.max_connections_per_user {
            // Insert-then-validate keeps the cap race-free for concurrent
            // registrations by the same user.
            self.connections.remove(handle.id);
            return Err(ApiError::RateLimited(format!(
                "connection limit reached ({} per user)",
                self.max_connections_per_user
            )));
        }
        self.rooms.join(handle.id, RoomId::user(&user.user_id));
        metrics::gauge!(
            "ws_connections_active",
            self.connections.connection_count() as f64
        );
        info!(user = %user.user_id, connection = %handle.id, count, "connection registered");

        if count == 1 {
            // First device online. Presence persistence failure must not
            // tear down an otherwise healthy connection.
            if let Err(e) = self.presence.set_online(&user.user_id).await {
                warn!(user = %user.user_id, error = %e, "failed to persist online presence");
            }
        }
        Ok(handle)
    }

    /// Remove a connection: leave every joined room, drop it from the
    /// user's connection set, and trigger the offline transition if it was
    /// the user's last device. Idempotent for already-removed connections.
    pub async fn unregister(&self, id: ConnectionId) {
        self.rooms.leave_all(id);
        let Some((handle, remaining)) = self.connections.remove(id) else {
            return;
        };
        metrics::gauge!(
            "ws_connections_active",
            self.connections.connection_count() as f64
        );
        info!(user = %handle.user_id, connection = %id, remaining, "connection unregistered");

        if remaining == 0 {
            if let Err(e) = self.presence.set_offline(&handle.user_id).await {
                warn!(user = %handle.user_id, error = %e, "failed to persist offline presence");
            }
        }
    }

    pub fn join(&self, id: ConnectionId, room: RoomId) {
        self.rooms.join(id, room);
    }

    pub fn leave(&self, id: ConnectionId, room: &RoomId) {
        self.rooms.leave(id, room);
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn connection_count(&self) -> usize {
        self.connections.connection_count()
    }
}
