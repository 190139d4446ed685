//! Poll voting endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
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
pub struct PollVoteInput {
    pub conversation_id: String,
    pub option_id: String,
}

/// POST /api/messages/{message_id}/poll/vote — toggle the caller's vote on
/// one option. Clients refresh the message from the `message_updated`
/// broadcast.
#[tracing::instrument(skip_all, fields(user = %auth_user.user_id, message = %message_id))]
pub async fn vote(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(message_id): Path<String>,
    Json(input): Json<PollVoteInput>,
) -> Result<Json<Value>, ApiError> {
    let convo = super::load_conversation(store.as_ref(), &input.conversation_id).await?;
    super::require_member(&convo, &auth_user.user_id)?;

    let user_name = super::lookup_user_name(store.as_ref(), &auth_user.user_id).await;
    let poll = mutations::toggle_poll_vote(
        store.as_ref(),
        &input.conversation_id,
        &message_id,
        &auth_user.user_id,
        &user_name,
        &input.option_id,
    )
    .await?;

    hub.dispatcher().emit_to_conversation(
        &input.conversation_id,
        ServerEvent::MessageUpdated {
            conversation_id: input.conversation_id.clone(),
            message_id,
            content: None,
            edited_at: None,
            is_recalled: None,
            recalled_at: None,
            poll_data: Some(poll.clone()),
            updated_option_id: Some(input.option_id),
            user_id: Some(auth_user.user_id),
        },
    );

    info!("poll vote recorded");
    Ok(Json(json!({ "success": true, "pollData": poll })))
}
