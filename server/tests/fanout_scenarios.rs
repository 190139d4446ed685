//! End-to-end fan-out scenarios over the in-process hub and memory store:
//! message delivery to conversation and personal rooms, unread counters,
//! reaction aggregates, presence transitions, and member removal.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use tokio::sync::mpsc;

use wren_server::auth::{AuthUser, StaticVerifier, TokenClaims};
use wren_server::handlers;
use wren_server::models::now_millis;
use wren_server::realtime::{ConnectionHandle, Hub, RoomId, ServerEvent};
use wren_server::store::{DocPath, DocumentStore, MemoryStore};

struct TestApp {
    store: Arc<dyn DocumentStore>,
    hub: Arc<Hub>,
    verifier: Arc<StaticVerifier>,
}

impl TestApp {
    fn new() -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let verifier = Arc::new(StaticVerifier::new());
        let hub = Arc::new(Hub::new(store.clone(), verifier.clone(), 5));
        Self {
            store,
            hub,
            verifier,
        }
    }

    async fn seed_user(&self, user_id: &str, friends: &[&str]) {
        self.store
            .set(
                &DocPath::user(user_id),
                json!({"name": user_id.to_uppercase(), "friends": friends}),
            )
            .await
            .unwrap();
    }

    async fn seed_conversation(&self, conversation_id: &str, members: &[&str], admins: &[&str]) {
        self.store
            .set(
                &DocPath::conversation(conversation_id),
                json!({
                    "memberIds": members,
                    "adminIds": admins,
                    "isGroup": members.len() > 2,
                    "unreadCounts": {},
                    "timestamp": now_millis(),
                }),
            )
            .await
            .unwrap();
    }

    /// Register a live connection for the user, as the WebSocket path would.
    async fn connect(
        &self,
        user_id: &str,
    ) -> (
        Arc<ConnectionHandle>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let token = format!("token-{user_id}");
        self.verifier.allow(&token, user_id);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.hub.register(&token, tx).await.unwrap();
        (handle, rx)
    }

    fn auth(&self, user_id: &str) -> AuthUser {
        AuthUser {
            user_id: user_id.to_string(),
            claims: TokenClaims {
                user_id: user_id.to_string(),
                issued_at: now_millis(),
            },
            role: None,
        }
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn message_send_updates_unread_and_reaches_rooms() {
    let app = TestApp::new();
    for user in ["x", "y", "z"] {
        app.seed_user(user, &[]).await;
    }
    app.seed_conversation("c1", &["x", "y", "z"], &[]).await;

    let (_hx, mut rx_x) = app.connect("x").await;
    let (hy, mut rx_y) = app.connect("y").await;
    let (_hz, mut rx_z) = app.connect("z").await;
    // Only Y is viewing the conversation.
    app.hub.join(hy.id, RoomId::conversation("c1"));

    let result = handlers::messages::send_message(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("x"),
        Json(
            serde_json::from_value(json!({
                "conversationId": "c1",
                "type": "TEXT",
                "content": "hello"
            }))
            .unwrap(),
        ),
    )
    .await
    .unwrap();
    assert!(result.0.success);

    // Unread counters: Y and Z incremented, X untouched.
    let convo = app
        .store
        .get(&DocPath::conversation("c1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(convo["unreadCounts"]["y"], 1);
    assert_eq!(convo["unreadCounts"]["z"], 1);
    assert!(convo["unreadCounts"].get("x").is_none());
    assert_eq!(convo["lastMessage"], "hello");

    // Personal-room copies for every member.
    let new_messages = |events: &[ServerEvent]| {
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::NewMessage(_)))
            .count()
    };
    assert_eq!(new_messages(&drain(&mut rx_x)), 1);
    assert_eq!(new_messages(&drain(&mut rx_z)), 1);
    // Y gets the conversation-room copy plus the personal copy.
    assert_eq!(new_messages(&drain(&mut rx_y)), 2);
}

#[tokio::test]
async fn repeated_reaction_taps_accumulate_and_broadcast() {
    let app = TestApp::new();
    app.seed_user("x", &[]).await;
    app.seed_user("y", &[]).await;
    app.seed_conversation("c1", &["x", "y"], &[]).await;
    app.store
        .set(
            &DocPath::message("c1", "m1"),
            json!({"conversationId": "c1", "senderId": "x", "type": "TEXT", "timestamp": 1}),
        )
        .await
        .unwrap();

    let (hx, mut rx_x) = app.connect("x").await;
    app.hub.join(hx.id, RoomId::conversation("c1"));

    for _ in 0..2 {
        handlers::reactions::set_reaction(
            State(app.store.clone()),
            State(app.hub.clone()),
            app.auth("y"),
            Path("m1".to_string()),
            Json(
                serde_json::from_value(json!({
                    "conversationId": "c1",
                    "reactionType": "heart"
                }))
                .unwrap(),
            ),
        )
        .await
        .unwrap();
    }

    let doc = app
        .store
        .get(&DocPath::message("c1", "m1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["reactionsDetailed"]["y"]["heart"], 2);
    assert_eq!(doc["reactionCounts"]["heart"], 2);
    assert_eq!(doc["reactions"]["y"], "heart");

    // One broadcast per tap.
    let events = drain(&mut rx_x);
    let reaction_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ServerEvent::ReactionUpdated { .. }))
        .collect();
    assert_eq!(reaction_events.len(), 2);
}

#[tokio::test]
async fn removing_a_reaction_subtracts_the_full_occurrence_count() {
    let app = TestApp::new();
    app.seed_user("y", &[]).await;
    app.seed_conversation("c1", &["x", "y"], &[]).await;
    app.store
        .set(
            &DocPath::message("c1", "m1"),
            json!({"conversationId": "c1", "senderId": "x", "type": "TEXT", "timestamp": 1}),
        )
        .await
        .unwrap();

    for _ in 0..2 {
        handlers::reactions::set_reaction(
            State(app.store.clone()),
            State(app.hub.clone()),
            app.auth("y"),
            Path("m1".to_string()),
            Json(
                serde_json::from_value(
                    json!({"conversationId": "c1", "reactionType": "heart"}),
                )
                .unwrap(),
            ),
        )
        .await
        .unwrap();
    }

    // reactionType null clears everything the user had.
    handlers::reactions::set_reaction(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("y"),
        Path("m1".to_string()),
        Json(serde_json::from_value(json!({"conversationId": "c1"})).unwrap()),
    )
    .await
    .unwrap();

    let doc = app
        .store
        .get(&DocPath::message("c1", "m1"))
        .await
        .unwrap()
        .unwrap();
    assert!(doc["reactionsDetailed"].get("y").is_none());
    assert!(doc["reactionCounts"].get("heart").is_none());
}

#[tokio::test]
async fn presence_notifies_friends_once_per_transition() {
    let app = TestApp::new();
    app.seed_user("u1", &["u2"]).await;
    app.seed_user("u2", &["u1"]).await;

    // u2 is online and will observe u1's transitions on their own room.
    let (_h2, mut rx2) = app.connect("u2").await;

    let (h1, _rx1) = app.connect("u1").await;
    let online: Vec<_> = drain(&mut rx2)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::FriendStatusChanged { is_online: true, .. }))
        .collect();
    assert_eq!(online.len(), 1);

    // Network drop: the socket task unregisters exactly once on teardown.
    app.hub.unregister(h1.id).await;
    app.hub.unregister(h1.id).await;

    let offline: Vec<_> = drain(&mut rx2)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::FriendStatusChanged { is_online: false, .. }))
        .collect();
    assert_eq!(offline.len(), 1, "offline fires once, not repeatedly");

    let doc = app.store.get(&DocPath::user("u1")).await.unwrap().unwrap();
    assert_eq!(doc["isOnline"], false);
}

#[tokio::test]
async fn removed_member_keeps_subscription_until_client_leaves() {
    let app = TestApp::new();
    for user in ["x", "y", "z"] {
        app.seed_user(user, &[]).await;
    }
    app.seed_conversation("c1", &["x", "y", "z"], &["x"]).await;

    let (hy, mut rx_y) = app.connect("y").await;
    let (hz, mut rx_z) = app.connect("z").await;
    app.hub.join(hy.id, RoomId::conversation("c1"));
    app.hub.join(hz.id, RoomId::conversation("c1"));

    // Admin X removes Z.
    handlers::conversations::remove_member(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("x"),
        Path(("c1".to_string(), "z".to_string())),
    )
    .await
    .unwrap();

    let convo = app
        .store
        .get(&DocPath::conversation("c1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(convo["memberIds"], json!(["x", "y"]));

    // Remaining members see the removal; the removed member is not evicted
    // from the room, so their still-open client sees it too.
    assert!(drain(&mut rx_y)
        .iter()
        .any(|e| matches!(e, ServerEvent::MemberRemoved { .. })));
    assert!(drain(&mut rx_z)
        .iter()
        .any(|e| matches!(e, ServerEvent::MemberRemoved { .. })));

    // Once Z's client leaves the room, conversation events stop reaching it.
    app.hub.leave(hz.id, &RoomId::conversation("c1"));
    handlers::messages::send_message(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("x"),
        Json(
            serde_json::from_value(json!({
                "conversationId": "c1",
                "type": "TEXT",
                "content": "after removal"
            }))
            .unwrap(),
        ),
    )
    .await
    .unwrap();

    assert!(drain(&mut rx_z).is_empty());
    assert!(drain(&mut rx_y)
        .iter()
        .any(|e| matches!(e, ServerEvent::NewMessage(_))));
}

#[tokio::test]
async fn mark_seen_resets_only_the_caller() {
    let app = TestApp::new();
    app.seed_user("x", &[]).await;
    app.seed_user("y", &[]).await;
    app.seed_conversation("c1", &["x", "y"], &[]).await;

    handlers::messages::send_message(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("x"),
        Json(
            serde_json::from_value(json!({
                "conversationId": "c1",
                "type": "TEXT",
                "content": "ping"
            }))
            .unwrap(),
        ),
    )
    .await
    .unwrap();

    handlers::conversations::mark_seen(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("y"),
        Path("c1".to_string()),
    )
    .await
    .unwrap();

    let convo = app
        .store
        .get(&DocPath::conversation("c1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(convo["unreadCounts"]["y"], 0);
}

#[tokio::test]
async fn accepted_friend_request_updates_both_sides_atomically() {
    let app = TestApp::new();
    app.seed_user("u1", &[]).await;
    app.seed_user("u2", &[]).await;

    let (_h1, mut rx1) = app.connect("u1").await;
    let (_h2, mut rx2) = app.connect("u2").await;

    let response = handlers::friends::send_request(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("u1"),
        Json(serde_json::from_value(json!({"receiverId": "u2"})).unwrap()),
    )
    .await
    .unwrap();
    let request_id = response.0["requestId"].as_str().unwrap().to_string();

    assert!(drain(&mut rx2)
        .iter()
        .any(|e| matches!(e, ServerEvent::FriendRequestReceived { .. })));

    handlers::friends::respond_request(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("u2"),
        Path(request_id),
        Json(serde_json::from_value(json!({"action": "accept"})).unwrap()),
    )
    .await
    .unwrap();

    let u1 = app.store.get(&DocPath::user("u1")).await.unwrap().unwrap();
    let u2 = app.store.get(&DocPath::user("u2")).await.unwrap().unwrap();
    assert_eq!(u1["friends"], json!(["u2"]));
    assert_eq!(u2["friends"], json!(["u1"]));

    let u1_events = drain(&mut rx1);
    assert!(u1_events
        .iter()
        .any(|e| matches!(e, ServerEvent::FriendRequestAccepted { .. })));
    assert!(u1_events
        .iter()
        .any(|e| matches!(e, ServerEvent::FriendAdded { .. })));
    assert!(drain(&mut rx2)
        .iter()
        .any(|e| matches!(e, ServerEvent::FriendAdded { .. })));
}

#[tokio::test]
async fn non_member_cannot_send() {
    let app = TestApp::new();
    app.seed_user("x", &[]).await;
    app.seed_user("intruder", &[]).await;
    app.seed_conversation("c1", &["x", "y"], &[]).await;

    let err = handlers::messages::send_message(
        State(app.store.clone()),
        State(app.hub.clone()),
        app.auth("intruder"),
        Json(
            serde_json::from_value(json!({
                "conversationId": "c1",
                "type": "TEXT",
                "content": "hi"
            }))
            .unwrap(),
        ),
    )
    .await
    .err()
    .expect("expected forbidden");
    assert!(format!("{err}").contains("not a member"));
}
