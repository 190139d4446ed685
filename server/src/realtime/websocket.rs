//! WebSocket endpoint
//!
//! Connection lifecycle: upgrade, authenticate within a bounded window,
//! register with the hub, then pump events out and client frames in until
//! either direction ends. A server-side ping detects dead peers; teardown
//! unregisters the connection exactly once, which is what drives the
//! offline presence transition for the user's last device.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{events::ClientMessage, ConnectionHandle, Hub, RoomId, ServerEvent};

/// A connection that has not authenticated within this window is dropped
/// without registration; no rooms were joined, nothing to clean up.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server ping cadence for stale-connection detection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// GET /ws (WebSocket upgrade)
pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<Hub>) {
    let Some(token) = await_handshake(&mut socket).await else {
        let _ = send_auth_error(&mut socket, "authentication required").await;
        return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = match hub.register(&token, tx).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "WebSocket authentication failed");
            let _ = send_auth_error(&mut socket, &e.to_string()).await;
            return;
        }
    };

    let (ws_tx, ws_rx) = socket.split();
    let mut send_task = tokio::spawn(write_loop(ws_tx, rx));
    let mut recv_task = tokio::spawn(read_loop(ws_rx, hub.clone(), handle.clone()));

    // Either side ending (clean close, transport error, failed heartbeat)
    // tears the other down.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister(handle.id).await;
    info!(user = %handle.user_id, connection = %handle.id, "WebSocket connection closed");
}

/// Wait for the authentication frame. Returns `None` on timeout, close, or
/// a first frame that is not `authenticate`.
async fn await_handshake(socket: &mut WebSocket) -> Option<String> {
    tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(frame)) = socket.recv().await {
            match frame {
                Message::Text(text) => {
                    return match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Authenticate { token }) => Some(token),
                        Ok(other) => {
                            warn!(?other, "first frame must be authenticate");
                            None
                        }
                        Err(e) => {
                            warn!(error = %e, "unparseable handshake frame");
                            None
                        }
                    };
                }
                Message::Close(_) => return None,
                // Control frames while waiting are fine.
                _ => continue,
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

async fn send_auth_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    let event = ServerEvent::AuthError {
        message: message.to_string(),
    };
    // AuthError is a plain struct of strings; serialization cannot fail.
    let text = serde_json::to_string(&event).expect("serialize auth error");
    socket.send(Message::Text(text.into())).await?;
    socket.send(Message::Close(None)).await
}

/// Forward queued events to the socket, interleaved with heartbeat pings.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; skip it.
    heartbeat.tick().await;
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(event) = maybe else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(event = event.name(), error = %e, "failed to serialize event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    debug!("heartbeat ping failed, connection likely closed");
                    break;
                }
            }
        }
    }
}

/// Process inbound frames until the peer closes or the transport dies.
async fn read_loop(mut ws_rx: SplitStream<WebSocket>, hub: Arc<Hub>, handle: Arc<ConnectionHandle>) {
    while let Some(Ok(frame)) = ws_rx.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(message) => handle_client_message(&hub, &handle, message),
                Err(e) => warn!(user = %handle.user_id, error = %e, "unparseable client frame"),
            },
            Message::Close(_) => break,
            // Pong replies are produced by axum automatically.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

fn handle_client_message(hub: &Hub, handle: &ConnectionHandle, message: ClientMessage) {
    match message {
        ClientMessage::Authenticate { .. } => {
            debug!(user = %handle.user_id, "already authenticated, ignoring");
        }
        ClientMessage::JoinConversation { conversation_id } => {
            debug!(user = %handle.user_id, conversation = %conversation_id, "join room");
            hub.join(handle.id, RoomId::conversation(conversation_id));
        }
        ClientMessage::LeaveConversation { conversation_id } => {
            debug!(user = %handle.user_id, conversation = %conversation_id, "leave room");
            hub.leave(handle.id, &RoomId::conversation(conversation_id));
        }
        ClientMessage::Typing {
            conversation_id,
            is_typing,
        } => {
            hub.dispatcher().emit_to_room_except(
                &RoomId::conversation(&conversation_id),
                handle.id,
                ServerEvent::UserTyping {
                    conversation_id,
                    user_id: handle.user_id.clone(),
                    is_typing,
                },
            );
        }
        ClientMessage::Ping => debug!(user = %handle.user_id, "client ping"),
    }
}
