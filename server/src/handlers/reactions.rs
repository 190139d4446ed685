//! Reaction endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::{
    auth::AuthUser,
    error::ApiError,
    mutations,
    realtime::{Hub, ServerEvent},
    store::DocumentStore,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionInput {
    pub conversation_id: String,
    /// `None` removes all of the caller's reactions.
    #[serde(default)]
    pub reaction_type: Option<String>,
}

/// POST /api/messages/{message_id}/reactions — add, change, or remove the
/// caller's reaction. Repeated taps on the same type accumulate.
#[tracing::instrument(skip_all, fields(user = %auth_user.user_id, message = %message_id))]
pub async fn set_reaction(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
    Json(input): Json<ReactionInput>,
) -> Result<Json<Value>, ApiError> {
    if let Some(kind) = &input.reaction_type {
        if kind.is_empty() || kind.len() > 16 {
            return Err(ApiError::Validation(
                "reaction type must be 1-16 characters".into(),
            ));
        }
    }

    let convo = super::load_conversation(store.as_ref(), &input.conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    let outcome = mutations::apply_reaction(
        store.as_ref(),
        &input.conversation_id,
        &message_id,
        &auth_user.user_id,
        input.reaction_type.as_deref(),
    )
    .await?;

    hub.dispatcher().emit_to_conversation(
        &input.conversation_id,
        ServerEvent::ReactionUpdated {
            conversation_id: input.conversation_id.clone(),
            message_id: message_id.clone(),
            user_id: auth_user.user_id.clone(),
            reaction_type: input.reaction_type.clone(),
            reactions: outcome.reactions.clone(),
            reaction_counts: outcome.reaction_counts.clone(),
        },
    );

    info!(counts = ?outcome.reaction_counts, "reaction updated");
    Ok(Json(json!({
        "success": true,
        "reactions": outcome.reactions,
        "reactionCounts": outcome.reaction_counts,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReactionsQuery {
    pub conversation_id: String,
}

/// DELETE /api/messages/{message_id}/reactions — clear every reaction on
/// the message, from every user.
pub async fn clear_reactions(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
    Query(query): Query<ClearReactionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &query.conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    mutations::clear_all_reactions(store.as_ref(), &query.conversation_id, &message_id).await?;

    hub.dispatcher().emit_to_conversation(
        &query.conversation_id,
        ServerEvent::ReactionUpdated {
            conversation_id: query.conversation_id.clone(),
            message_id,
            user_id: auth_user.user_id,
            reaction_type: None,
            reactions: HashMap::new(),
            reaction_counts: HashMap::new(),
        },
    );

    Ok(Json(json!({
        "success": true,
        "reactions": {},
        "reactionCounts": {},
    })))
}
