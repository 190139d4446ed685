//! Presence tracking
//!
//! Persists online/offline + lastSeen on connect and disconnect, then fans
//! a `friend_status_changed` event out to each friend's personal room.
//!
//! Staleness is a presentation concern: clients treat an "online" flag as
//! stale once `now - lastSeen` exceeds [`STALE_AFTER_MILLIS`]. The server
//! never flips stale flags itself; a client that crashes without a clean
//! close stays online until its socket times out and the disconnect path
//! runs. Accepted limitation, inherited from the disconnect-driven model.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::dispatcher::EventDispatcher;
use super::events::ServerEvent;
use crate::models::{now_millis, UserRecord};
use crate::store::{DocPath, DocumentStore, FieldOp, StoreError};

/// After this long without a lastSeen refresh, clients render "offline".
pub const STALE_AFTER_MILLIS: i64 = Duration::from_secs(5 * 60).as_millis() as i64;

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn DocumentStore>,
    dispatcher: EventDispatcher,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn DocumentStore>, dispatcher: EventDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn set_online(&self, user_id: &str) -> Result<(), StoreError> {
        self.transition(user_id, true).await
    }

    pub async fn set_offline(&self, user_id: &str) -> Result<(), StoreError> {
        self.transition(user_id, false).await
    }

    async fn transition(&self, user_id: &str, is_online: bool) -> Result<(), StoreError> {
        let last_seen = now_millis();
        let path = DocPath::user(user_id);
        self.store
            .update(
                &path,
                vec![
                    ("isOnline".into(), FieldOp::Set(is_online.into())),
                    ("lastSeen".into(), FieldOp::Set(last_seen.into())),
                ],
            )
            .await?;
        debug!(user = user_id, is_online, "presence persisted");

        // Friend fan-out is best-effort on top of the committed write.
        match self.store.get(&path).await? {
            Some(doc) => {
                let user: UserRecord = serde_json::from_value(doc)?;
                for friend_id in &user.friends {
                    self.dispatcher.emit_to_user(
                        friend_id,
                        ServerEvent::FriendStatusChanged {
                            friend_id: user_id.to_string(),
                            is_online,
                            last_seen,
                        },
                    );
                }
            }
            None => warn!(user = user_id, "user record vanished during presence update"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::registry::{ConnectionHandle, ConnectionRegistry};
    use crate::realtime::rooms::{RoomId, RoomRegistry};
    use crate::store::MemoryStore;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn setup() -> (PresenceTracker, Arc<MemoryStore>, Arc<ConnectionRegistry>, Arc<RoomRegistry>) {
        let store = Arc::new(MemoryStore::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let dispatcher = EventDispatcher::new(connections.clone(), rooms.clone());
        let tracker = PresenceTracker::new(store.clone(), dispatcher);
        (tracker, store, connections, rooms)
    }

    #[tokio::test]
    async fn online_transition_persists_and_notifies_friends() {
        let (tracker, store, connections, rooms) = setup().await;
        store
            .set(&DocPath::user("u1"), json!({"friends": ["u2"]}))
            .await
            .unwrap();
        store
            .set(&DocPath::user("u2"), json!({"friends": ["u1"]}))
            .await
            .unwrap();

        // u2 is connected and sits in their personal room.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Arc::new(ConnectionHandle::new("u2".into(), 0, tx));
        let id = handle.id;
        connections.insert(handle);
        rooms.join(id, RoomId::user("u2"));

        tracker.set_online("u1").await.unwrap();

        let doc = store.get(&DocPath::user("u1")).await.unwrap().unwrap();
        assert_eq!(doc["isOnline"], true);
        assert!(doc["lastSeen"].as_i64().unwrap() > 0);

        match rx.recv().await.unwrap() {
            ServerEvent::FriendStatusChanged {
                friend_id,
                is_online,
                ..
            } => {
                assert_eq!(friend_id, "u1");
                assert!(is_online);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_transition_keeps_last_seen_monotonic() {
        let (tracker, store, _connections, _rooms) = setup().await;
        store
            .set(&DocPath::user("u1"), json!({"friends": []}))
            .await
            .unwrap();

        tracker.set_online("u1").await.unwrap();
        let online = store.get(&DocPath::user("u1")).await.unwrap().unwrap();
        let online_seen = online["lastSeen"].as_i64().unwrap();

        tracker.set_offline("u1").await.unwrap();
        let offline = store.get(&DocPath::user("u1")).await.unwrap().unwrap();
        assert_eq!(offline["isOnline"], false);
        assert!(offline["lastSeen"].as_i64().unwrap() >= online_seen);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (tracker, _store, _connections, _rooms) = setup().await;
        assert!(matches!(
            tracker.set_online("ghost").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
