//! HTTP surface
//!
//! Route handlers validate the request, persist through the document store
//! (via the mutation coordinator where aggregate fields are involved), and
//! only then hand the resulting event to the dispatcher. A failed mutation
//! is returned to the caller and never partially broadcast; a failed
//! broadcast never rolls a committed mutation back.

pub mod conversations;
pub mod friends;
pub mod messages;
pub mod polls;
pub mod reactions;
pub mod users;

use crate::{
    error::ApiError,
    models::{Conversation, Message, UserRecord},
    store::{DocPath, DocumentStore, StoreError},
};

pub(crate) async fn load_conversation(
    store: &dyn DocumentStore,
    conversation_id: &str,
) -> Result<Conversation, ApiError> {
    let doc = store
        .get(&DocPath::conversation(conversation_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("conversation {conversation_id}")))?;
    Ok(serde_json::from_value(doc).map_err(StoreError::from)?)
}

pub(crate) async fn load_message(
    store: &dyn DocumentStore,
    conversation_id: &str,
    message_id: &str,
) -> Result<Message, ApiError> {
    let doc = store
        .get(&DocPath::message(conversation_id, message_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("message {message_id}")))?;
    Ok(serde_json::from_value(doc).map_err(StoreError::from)?)
}

pub(crate) fn require_member(convo: &Conversation, user_id: &str) -> Result<(), ApiError> {
    if convo.is_member(user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "not a member of this conversation".into(),
        ))
    }
}

/// Display name for event payloads, from the user record when available.
pub(crate) async fn lookup_user_name(store: &dyn DocumentStore, user_id: &str) -> String {
    match store.get(&DocPath::user(user_id)).await {
        Ok(Some(doc)) => serde_json::from_value::<UserRecord>(doc)
            .map(|user| user.preferred_name().to_string())
            .unwrap_or_else(|_| "Unknown".to_string()),
        _ => "Unknown".to_string(),
    }
}
