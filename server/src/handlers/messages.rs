//! Message endpoints: send, edit/recall, delete

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{now_millis, Message, MessageKind, MessageView, PollData},
    mutations,
    realtime::{Hub, ServerEvent},
    store::{DocPath, DocumentStore, FieldOp, OrderBy, StoreError},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub conversation_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub poll_data: Option<PollData>,
    /// Optional typed payload fields (file metadata, reply references,
    /// location, stickers, ...) carried through to the stored document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageOutput {
    pub success: bool,
    pub message_id: String,
    pub message: MessageView,
}

/// POST /api/messages
#[tracing::instrument(skip_all, fields(user = %auth_user.user_id, conversation = %input.conversation_id))]
pub async fn send_message(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<SendMessageOutput>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &input.conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    let mut poll_data = input.poll_data;
    match (input.kind, &mut poll_data) {
        (MessageKind::Poll, Some(poll)) => {
            if poll.options.len() < 2 {
                return Err(ApiError::Validation(
                    "a poll needs at least two options".into(),
                ));
            }
            // Votes start empty regardless of what the client sent.
            for option in &mut poll.options {
                option.voters.clear();
                option.voter_ids.clear();
                option.vote_count = 0;
            }
        }
        (MessageKind::Poll, None) => {
            return Err(ApiError::Validation("poll message requires pollData".into()));
        }
        (_, Some(_)) => {
            return Err(ApiError::Validation(
                "pollData is only valid for POLL messages".into(),
            ));
        }
        _ => {}
    }

    let sender_name = match input.sender_name {
        Some(name) => name,
        None => super::lookup_user_name(store.as_ref(), &auth_user.user_id).await,
    };

    let timestamp = now_millis();
    let message = Message {
        conversation_id: input.conversation_id.clone(),
        sender_id: auth_user.user_id.clone(),
        sender_name: Some(sender_name),
        kind: input.kind,
        content: input.content.unwrap_or_default(),
        timestamp,
        is_recalled: false,
        recalled_at: None,
        edited_at: None,
        reactions: HashMap::new(),
        reactions_detailed: HashMap::new(),
        reaction_counts: HashMap::new(),
        poll_data,
        extra: input.extra,
    };

    let message_id = Ulid::new().to_string();
    store
        .set(
            &DocPath::message(&input.conversation_id, &message_id),
            serde_json::to_value(&message).map_err(StoreError::from)?,
        )
        .await?;

    // Conversation preview: a plain unguarded write, last-writer-wins.
    let preview = if message.content.is_empty() {
        format!("[{}]", message.kind.label())
    } else {
        message.content.clone()
    };
    store
        .update(
            &DocPath::conversation(&input.conversation_id),
            vec![
                ("lastMessage".into(), FieldOp::Set(json!(preview))),
                ("lastMessageTime".into(), FieldOp::Set(json!(timestamp))),
                ("timestamp".into(), FieldOp::Set(json!(timestamp))),
            ],
        )
        .await?;

    // The message is persisted; counter failures must not fail the send.
    if let Err(e) = mutations::increment_unread(
        store.as_ref(),
        &input.conversation_id,
        &convo.member_ids,
        &auth_user.user_id,
    )
    .await
    {
        error!(error = %e, "failed to update unread counters");
    }

    metrics::counter!("messages_sent_total", 1);

    let view = MessageView {
        id: message_id.clone(),
        message,
    };
    let dispatcher = hub.dispatcher();
    dispatcher.emit_to_conversation(&input.conversation_id, ServerEvent::NewMessage(view.clone()));
    // Personal-room copies drive home-screen previews and unread badges for
    // members not currently viewing this conversation.
    for member in &convo.member_ids {
        dispatcher.emit_to_user(member, ServerEvent::NewMessage(view.clone()));
    }

    info!(message = %message_id, "message sent");
    Ok(Json(SendMessageOutput {
        success: true,
        message_id,
        message: view,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/conversations/{conversation_id}/messages — newest first
pub async fn list_messages(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    let limit = query.limit.unwrap_or(50).min(200);
    let results = store
        .query(
            &format!("conversations/{conversation_id}/messages"),
            Vec::new(),
            Some(OrderBy::desc("timestamp")),
            Some(limit),
        )
        .await?;

    let messages: Vec<Value> = results
        .into_iter()
        .map(|(id, mut fields)| {
            if let Some(map) = fields.as_object_mut() {
                map.insert("id".into(), json!(id));
            }
            fields
        })
        .collect();
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Recall,
    Edit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageInput {
    pub conversation_id: String,
    pub action: UpdateAction,
    #[serde(default)]
    pub content: Option<String>,
}

/// PUT /api/messages/{message_id} — recall or edit, sender only
pub async fn update_message(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
    Json(input): Json<UpdateMessageInput>,
) -> Result<Json<Value>, ApiError> {
    let message =
        super::load_message(store.as_ref(), &input.conversation_id, &message_id).await?;
    if message.sender_id != auth_user.user_id {
        warn!(
            user = %auth_user.user_id,
            sender = %message.sender_id,
            "attempt to update someone else's message"
        );
        return Err(ApiError::Forbidden("not the sender of this message".into()));
    }

    let now = now_millis();
    let (ops, event) = match input.action {
        UpdateAction::Recall => (
            vec![
                ("isRecalled".to_string(), FieldOp::Set(json!(true))),
                ("recalledAt".to_string(), FieldOp::Set(json!(now))),
            ],
            ServerEvent::MessageUpdated {
                conversation_id: input.conversation_id.clone(),
                message_id: message_id.clone(),
                content: None,
                edited_at: None,
                is_recalled: Some(true),
                recalled_at: Some(now),
                poll_data: None,
                updated_option_id: None,
                user_id: None,
            },
        ),
        UpdateAction::Edit => {
            let content = input
                .content
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ApiError::Validation("content required for edit action".into()))?;
            (
                vec![
                    ("content".to_string(), FieldOp::Set(json!(content))),
                    ("editedAt".to_string(), FieldOp::Set(json!(now))),
                ],
                ServerEvent::MessageUpdated {
                    conversation_id: input.conversation_id.clone(),
                    message_id: message_id.clone(),
                    content: Some(content),
                    edited_at: Some(now),
                    is_recalled: None,
                    recalled_at: None,
                    poll_data: None,
                    updated_option_id: None,
                    user_id: None,
                },
            )
        }
    };

    store
        .update(&DocPath::message(&input.conversation_id, &message_id), ops)
        .await?;
    hub.dispatcher()
        .emit_to_conversation(&input.conversation_id, event);

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageQuery {
    pub conversation_id: String,
}

/// DELETE /api/messages/{message_id} — hard delete, sender only
pub async fn delete_message(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
    Query(query): Query<DeleteMessageQuery>,
) -> Result<Json<Value>, ApiError> {
    let message =
        super::load_message(store.as_ref(), &query.conversation_id, &message_id).await?;
    if message.sender_id != auth_user.user_id {
        warn!(
            user = %auth_user.user_id,
            sender = %message.sender_id,
            "attempt to delete someone else's message"
        );
        return Err(ApiError::Forbidden("not the sender of this message".into()));
    }

    store
        .delete(&DocPath::message(&query.conversation_id, &message_id))
        .await?;
    hub.dispatcher().emit_to_conversation(
        &query.conversation_id,
        ServerEvent::MessageDeleted {
            conversation_id: query.conversation_id.clone(),
            message_id,
        },
    );

    Ok(Json(json!({ "success": true })))
}
