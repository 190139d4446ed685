//! Document models
//!
//! These mirror the camelCase field names of the stored JSON documents.
//! `Message` keeps unknown optional payload fields (file metadata, reply
//! references, location, stickers, ...) in a flattened map so typed code
//! only names the fields the core logic touches.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Epoch milliseconds, the timestamp unit used across all documents.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `users/<id>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub is_banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_logout_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    /// `name`, falling back to `displayName`, falling back to "Unknown".
    pub fn preferred_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// `conversations/<id>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub member_names: HashMap<String, String>,
    #[serde(default)]
    pub admin_ids: Vec<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub last_message_time: i64,
    /// Sort key for the conversation list; tracks the last activity.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub unread_counts: HashMap<String, i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Conversation {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_ids.iter().any(|a| a == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Voice,
    Sticker,
    Location,
    Contact,
    Poll,
}

impl MessageKind {
    /// Wire label, used for `[TYPE]` conversation previews.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::Image => "IMAGE",
            MessageKind::File => "FILE",
            MessageKind::Voice => "VOICE",
            MessageKind::Sticker => "STICKER",
            MessageKind::Location => "LOCATION",
            MessageKind::Contact => "CONTACT",
            MessageKind::Poll => "POLL",
        }
    }
}

/// `conversations/<id>/messages/<mid>`
///
/// Core fields are immutable after send; the mutable overlay
/// (recall/edit/reactions/poll votes) is only touched through the
/// mutation coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub is_recalled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    /// Flattened view: each user's primary reaction type.
    #[serde(default)]
    pub reactions: HashMap<String, String>,
    /// Source of truth: per-user occurrence counts per reaction type.
    #[serde(default)]
    pub reactions_detailed: HashMap<String, HashMap<String, i64>>,
    /// Derived aggregate, always recomputed from `reactions_detailed`.
    #[serde(default)]
    pub reaction_counts: HashMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_data: Option<PollData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollData {
    pub question: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: String,
    pub text: String,
    /// Derived from `voters.len()`, never tracked independently.
    #[serde(default)]
    pub vote_count: i64,
    #[serde(default)]
    pub voters: Vec<PollVoter>,
    #[serde(default)]
    pub voter_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVoter {
    pub user_id: String,
    pub user_name: String,
    pub voted_at: i64,
}

/// A message together with its document id, the shape broadcast to clients
/// and returned from the send endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    #[serde(flatten)]
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// `friendRequests/<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub sender_id: String,
    pub receiver_id: String,
    pub status: FriendRequestStatus,
    pub created_at: i64,
}
