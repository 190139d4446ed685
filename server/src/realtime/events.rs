//! Wire events
//!
//! Server-to-client events are JSON text frames shaped
//! `{"event": "<snake_case name>", "data": {...}}`; client-to-server frames
//! use the same envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::models::{MessageView, PollData};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(MessageView),
    #[serde(rename_all = "camelCase")]
    MessageUpdated {
        conversation_id: String,
        message_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        edited_at: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_recalled: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recalled_at: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        poll_data: Option<PollData>,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_option_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        conversation_id: String,
        message_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ReactionUpdated {
        conversation_id: String,
        message_id: String,
        user_id: String,
        reaction_type: Option<String>,
        reactions: HashMap<String, String>,
        reaction_counts: HashMap<String, i64>,
    },
    #[serde(rename_all = "camelCase")]
    MessageRead {
        conversation_id: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    FriendStatusChanged {
        friend_id: String,
        is_online: bool,
        last_seen: i64,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestReceived {
        request_id: String,
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted {
        request_id: String,
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestRejected {
        request_id: String,
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FriendAdded {
        user_id: String,
        friend_id: String,
    },
    #[serde(rename_all = "camelCase")]
    FriendRemoved {
        user_id: String,
        friend_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ConversationCreated {
        conversation_id: String,
        conversation: Value,
    },
    #[serde(rename_all = "camelCase")]
    ConversationUpdated {
        conversation_id: String,
        updates: Value,
    },
    #[serde(rename_all = "camelCase")]
    ConversationDeleted {
        conversation_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MemberAdded {
        conversation_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename_all = "camelCase")]
    MemberRemoved {
        conversation_id: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MemberLeft {
        conversation_id: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    AdminUpdated {
        conversation_id: String,
        admin_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    AuthError {
        message: String,
    },
}

impl ServerEvent {
    /// Wire name, for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageUpdated { .. } => "message_updated",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::ReactionUpdated { .. } => "reaction_updated",
            ServerEvent::MessageRead { .. } => "message_read",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::FriendStatusChanged { .. } => "friend_status_changed",
            ServerEvent::FriendRequestReceived { .. } => "friend_request_received",
            ServerEvent::FriendRequestAccepted { .. } => "friend_request_accepted",
            ServerEvent::FriendRequestRejected { .. } => "friend_request_rejected",
            ServerEvent::FriendAdded { .. } => "friend_added",
            ServerEvent::FriendRemoved { .. } => "friend_removed",
            ServerEvent::ConversationCreated { .. } => "conversation_created",
            ServerEvent::ConversationUpdated { .. } => "conversation_updated",
            ServerEvent::ConversationDeleted { .. } => "conversation_deleted",
            ServerEvent::MemberAdded { .. } => "member_added",
            ServerEvent::MemberRemoved { .. } => "member_removed",
            ServerEvent::MemberLeft { .. } => "member_left",
            ServerEvent::AdminUpdated { .. } => "admin_updated",
            ServerEvent::AuthError { .. } => "auth_error",
        }
    }
}

/// Client-to-server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Authenticate { token: String },
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        is_typing: bool,
    },
    /// Keep-alive; no action beyond resetting the peer's idle state.
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_event_envelope_shape() {
        let event = ServerEvent::FriendStatusChanged {
            friend_id: "u2".into(),
            is_online: true,
            last_seen: 1234,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "friend_status_changed");
        assert_eq!(value["data"]["friendId"], "u2");
        assert_eq!(value["data"]["isOnline"], true);
        assert_eq!(event.name(), "friend_status_changed");
    }

    #[test]
    fn client_message_parses_join_and_typing() {
        let join: ClientMessage = serde_json::from_value(json!({
            "event": "join_conversation",
            "data": {"conversationId": "c1"}
        }))
        .unwrap();
        assert!(matches!(
            join,
            ClientMessage::JoinConversation { conversation_id } if conversation_id == "c1"
        ));

        let typing: ClientMessage = serde_json::from_value(json!({
            "event": "typing",
            "data": {"conversationId": "c1", "isTyping": true}
        }))
        .unwrap();
        assert!(matches!(
            typing,
            ClientMessage::Typing { is_typing: true, .. }
        ));
    }

    #[test]
    fn reaction_updated_serializes_null_reaction_type() {
        let event = ServerEvent::ReactionUpdated {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
            user_id: "u1".into(),
            reaction_type: None,
            reactions: HashMap::new(),
            reaction_counts: HashMap::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["data"]["reactionType"].is_null());
    }
}
