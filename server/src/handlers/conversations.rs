//! Conversation endpoints: CRUD, membership, admins, mark-seen

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use ulid::Ulid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{now_millis, Conversation},
    mutations,
    realtime::{Hub, ServerEvent},
    store::{DocPath, DocumentStore, FieldOp, Filter, OrderBy, StoreError},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationInput {
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub member_names: HashMap<String, String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
}

/// POST /api/conversations
pub async fn create_conversation(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Json(input): Json<CreateConversationInput>,
) -> Result<Json<Value>, ApiError> {
    let mut member_ids = input.member_ids;
    if !member_ids.iter().any(|m| m == &auth_user.user_id) {
        member_ids.push(auth_user.user_id.clone());
    }
    if member_ids.len() < 2 {
        return Err(ApiError::Validation(
            "a conversation needs at least two members".into(),
        ));
    }

    let now = now_millis();
    let convo = Conversation {
        member_ids: member_ids.clone(),
        member_names: input.member_names,
        // Group creators start as the only admin.
        admin_ids: if input.is_group {
            vec![auth_user.user_id.clone()]
        } else {
            Vec::new()
        },
        is_group: input.is_group,
        group_name: input.group_name,
        created_by: Some(auth_user.user_id.clone()),
        created_at: now,
        last_message: String::new(),
        last_message_time: now,
        timestamp: now,
        unread_counts: HashMap::new(),
        extra: Map::new(),
    };

    let conversation_id = Ulid::new().to_string();
    let fields = serde_json::to_value(&convo).map_err(StoreError::from)?;
    store
        .set(&DocPath::conversation(&conversation_id), fields.clone())
        .await?;

    for member in &member_ids {
        hub.dispatcher().emit_to_user(
            member,
            ServerEvent::ConversationCreated {
                conversation_id: conversation_id.clone(),
                conversation: fields.clone(),
            },
        );
    }

    info!(conversation = %conversation_id, members = member_ids.len(), "conversation created");
    Ok(Json(
        json!({ "success": true, "conversationId": conversation_id }),
    ))
}

/// GET /api/conversations — the caller's conversations, most recent first
pub async fn list_conversations(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let results = store
        .query(
            "conversations",
            vec![Filter::array_contains("memberIds", auth_user.user_id)],
            Some(OrderBy::desc("timestamp")),
            Some(50),
        )
        .await?;

    let conversations: Vec<Value> = results
        .into_iter()
        .map(|(id, mut fields)| {
            if let Some(map) = fields.as_object_mut() {
                map.insert("id".into(), json!(id));
            }
            fields
        })
        .collect();

    Ok(Json(json!({ "conversations": conversations })))
}

/// Field names clients may not write directly.
const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "memberIds",
    "memberNames",
    "adminIds",
    "unreadCounts",
    "createdAt",
    "createdBy",
];

/// PUT /api/conversations/{conversation_id} — rename, avatar, etc.
pub async fn update_conversation(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
    Json(mut updates): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    for field in PROTECTED_FIELDS {
        updates.remove(*field);
    }
    if updates.is_empty() {
        return Err(ApiError::Validation("no updatable fields provided".into()));
    }

    let ops = updates
        .iter()
        .map(|(field, value)| (field.clone(), FieldOp::Set(value.clone())))
        .collect();
    store
        .update(&DocPath::conversation(&conversation_id), ops)
        .await?;

    hub.dispatcher().emit_to_conversation(
        &conversation_id,
        ServerEvent::ConversationUpdated {
            conversation_id: conversation_id.clone(),
            updates: Value::Object(updates),
        },
    );

    Ok(Json(json!({ "success": true })))
}

/// DELETE /api/conversations/{conversation_id} — creator or admin only
pub async fn delete_conversation(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    let allowed = convo.created_by.as_deref() == Some(auth_user.user_id.as_str())
        || convo.is_admin(&auth_user.user_id);
    if !allowed {
        return Err(ApiError::Forbidden(
            "only the creator or an admin can delete a conversation".into(),
        ));
    }

    store.delete(&DocPath::conversation(&conversation_id)).await?;

    let event = ServerEvent::ConversationDeleted {
        conversation_id: conversation_id.clone(),
    };
    hub.dispatcher()
        .emit_to_conversation(&conversation_id, event.clone());
    for member in &convo.member_ids {
        hub.dispatcher().emit_to_user(member, event.clone());
    }

    info!(conversation = %conversation_id, "conversation deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberInput {
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// POST /api/conversations/{conversation_id}/members
pub async fn add_member(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
    Json(input): Json<AddMemberInput>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    let user_name = input
        .user_name
        .unwrap_or_else(|| "Unknown".to_string());
    store
        .update(
            &DocPath::conversation(&conversation_id),
            vec![
                (
                    "memberIds".into(),
                    FieldOp::ArrayUnion(json!(input.user_id)),
                ),
                (
                    format!("memberNames.{}", input.user_id),
                    FieldOp::Set(json!(user_name)),
                ),
            ],
        )
        .await?;

    let event = ServerEvent::MemberAdded {
        conversation_id: conversation_id.clone(),
        user_id: input.user_id.clone(),
        user_name,
    };
    hub.dispatcher()
        .emit_to_conversation(&conversation_id, event.clone());
    // The new member learns about the conversation on their personal room.
    hub.dispatcher().emit_to_user(&input.user_id, event);

    Ok(Json(json!({ "success": true })))
}

/// DELETE /api/conversations/{conversation_id}/members/{user_id} — group
/// admin only. The removed member's live room subscription is left to lapse
/// on their next client-side leave; the server does not evict it.
pub async fn remove_member(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path((conversation_id, user_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    if !convo.is_group {
        return Err(ApiError::Forbidden(
            "only group conversations support member removal".into(),
        ));
    }
    if !convo.is_admin(&auth_user.user_id) {
        return Err(ApiError::Forbidden("admin access required".into()));
    }
    if !convo.is_member(&user_id) {
        return Err(ApiError::NotFound(format!(
            "user {user_id} is not a member"
        )));
    }

    remove_membership(store.as_ref(), &conversation_id, &user_id).await?;
    hub.dispatcher().emit_to_conversation(
        &conversation_id,
        ServerEvent::MemberRemoved {
            conversation_id: conversation_id.clone(),
            user_id,
        },
    );

    Ok(Json(json!({ "success": true })))
}

/// POST /api/conversations/{conversation_id}/leave
pub async fn leave_conversation(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    remove_membership(store.as_ref(), &conversation_id, &auth_user.user_id).await?;
    hub.dispatcher().emit_to_conversation(
        &conversation_id,
        ServerEvent::MemberLeft {
            conversation_id: conversation_id.clone(),
            user_id: auth_user.user_id,
        },
    );

    Ok(Json(json!({ "success": true })))
}

async fn remove_membership(
    store: &dyn DocumentStore,
    conversation_id: &str,
    user_id: &str,
) -> Result<(), StoreError> {
    store
        .update(
            &DocPath::conversation(conversation_id),
            vec![
                ("memberIds".into(), FieldOp::ArrayRemove(json!(user_id))),
                ("adminIds".into(), FieldOp::ArrayRemove(json!(user_id))),
                (format!("memberNames.{user_id}"), FieldOp::Delete),
                (format!("unreadCounts.{user_id}"), FieldOp::Delete),
            ],
        )
        .await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminInput {
    pub user_id: String,
    pub grant: bool,
}

/// POST /api/conversations/{conversation_id}/admins — grant or revoke
pub async fn set_admin(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
    Json(input): Json<SetAdminInput>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    if !convo.is_group {
        return Err(ApiError::Forbidden(
            "only group conversations have admins".into(),
        ));
    }
    if !convo.is_admin(&auth_user.user_id) {
        return Err(ApiError::Forbidden("admin access required".into()));
    }
    if input.grant && !convo.is_member(&input.user_id) {
        return Err(ApiError::Validation(
            "cannot promote a non-member to admin".into(),
        ));
    }

    let op = if input.grant {
        FieldOp::ArrayUnion(json!(input.user_id))
    } else {
        FieldOp::ArrayRemove(json!(input.user_id))
    };
    store
        .update(
            &DocPath::conversation(&conversation_id),
            vec![("adminIds".into(), op)],
        )
        .await?;

    let updated = super::load_conversation(store.as_ref(), &conversation_id).await?;
    hub.dispatcher().emit_to_conversation(
        &conversation_id,
        ServerEvent::AdminUpdated {
            conversation_id: conversation_id.clone(),
            admin_ids: updated.admin_ids.clone(),
        },
    );

    Ok(Json(json!({ "success": true, "adminIds": updated.admin_ids })))
}

/// POST /api/conversations/{conversation_id}/seen — reset the caller's own
/// unread counter
pub async fn mark_seen(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    mutations::reset_unread(store.as_ref(), &conversation_id, &auth_user.user_id).await?;
    hub.dispatcher().emit_to_conversation(
        &conversation_id,
        ServerEvent::MessageRead {
            conversation_id: conversation_id.clone(),
            user_id: auth_user.user_id,
        },
    );

    Ok(Json(json!({ "success": true })))
}
