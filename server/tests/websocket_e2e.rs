//! WebSocket lifecycle tests against a live server: handshake auth,
//! presence fan-out between friends, room join, and typing relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

use wren_server::auth::StaticVerifier;
use wren_server::config::Config;
use wren_server::realtime::RoomId;
use wren_server::routes;
use wren_server::state::AppState;
use wren_server::store::{DocPath, DocumentStore, MemoryStore};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    verifier: Arc<StaticVerifier>,
}

async fn start_server() -> TestServer {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let verifier = Arc::new(StaticVerifier::new());
    let config = Config {
        port: 0,
        allowed_origins: vec!["*".to_string()],
        jwt_secret: "test".to_string(),
        max_connections_per_user: 5,
        rate_limit_per_minute: 10_000,
    };
    let state = AppState::new(store, verifier.clone(), config);
    let app = routes::router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        verifier,
    }
}

async fn connect_and_authenticate(server: &TestServer, token: &str) -> WsClient {
    let (mut ws, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    let frame = json!({"event": "authenticate", "data": {"token": token}});
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    ws
}

/// Next JSON event frame, skipping control frames.
async fn next_event(ws: &mut WsClient) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
        panic!("connection closed while waiting for event");
    })
    .await
    .expect("timed out waiting for event")
}

/// Spin until `predicate` holds, for state that settles asynchronously.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_token_gets_auth_error_and_close() {
    let server = start_server().await;
    let mut ws = connect_and_authenticate(&server, "bogus").await;

    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "auth_error");
    assert_eq!(server.state.hub.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn friends_see_presence_transitions() {
    let server = start_server().await;
    server
        .state
        .store
        .set(&DocPath::user("u1"), json!({"friends": ["u2"]}))
        .await
        .unwrap();
    server
        .state
        .store
        .set(&DocPath::user("u2"), json!({"friends": ["u1"]}))
        .await
        .unwrap();
    server.verifier.allow("t1", "u1");
    server.verifier.allow("t2", "u2");

    let mut ws1 = connect_and_authenticate(&server, "t1").await;
    wait_for(|| server.state.hub.connection_count() == 1).await;

    // u2 comes online; u1 hears about it on their personal room.
    let _ws2 = connect_and_authenticate(&server, "t2").await;
    let event = next_event(&mut ws1).await;
    assert_eq!(event["event"], "friend_status_changed");
    assert_eq!(event["data"]["friendId"], "u2");
    assert_eq!(event["data"]["isOnline"], true);

    // u2 drops without a clean close; u1 eventually sees offline.
    drop(_ws2);
    let event = next_event(&mut ws1).await;
    assert_eq!(event["event"], "friend_status_changed");
    assert_eq!(event["data"]["isOnline"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_relays_to_the_room_but_not_the_sender() {
    let server = start_server().await;
    for user in ["u1", "u2"] {
        server
            .state
            .store
            .set(&DocPath::user(user), json!({"friends": []}))
            .await
            .unwrap();
    }
    server.verifier.allow("t1", "u1");
    server.verifier.allow("t2", "u2");

    let mut ws1 = connect_and_authenticate(&server, "t1").await;
    let mut ws2 = connect_and_authenticate(&server, "t2").await;
    wait_for(|| server.state.hub.connection_count() == 2).await;

    ws1.send(Message::Text(
        json!({"event": "join_conversation", "data": {"conversationId": "c1"}}).to_string(),
    ))
    .await
    .unwrap();
    let hub = server.state.hub.clone();
    wait_for(move || {
        hub.rooms()
            .subscribers_of(&RoomId::conversation("c1"))
            .len()
            == 1
    })
    .await;

    ws2.send(Message::Text(
        json!({"event": "typing", "data": {"conversationId": "c1", "isTyping": true}}).to_string(),
    ))
    .await
    .unwrap();

    let event = next_event(&mut ws1).await;
    assert_eq!(event["event"], "user_typing");
    assert_eq!(event["data"]["userId"], "u2");
    assert_eq!(event["data"]["isTyping"], true);
}
