//! Poll vote mutations
//!
//! Toggle semantics per option: vote if absent, retract if present. Vote
//! counts are derived from the voter list length on every mutation, never
//! tracked independently, so concurrent votes through separate transactions
//! cannot drift the count.

use serde_json::json;

use crate::error::ApiError;
use crate::models::{now_millis, PollData, PollVoter};
use crate::store::{DocPath, DocumentStore, FieldOp, StoreError};

pub async fn toggle_poll_vote(
    store: &dyn DocumentStore,
    conversation_id: &str,
    message_id: &str,
    user_id: &str,
    user_name: &str,
    option_id: &str,
) -> Result<PollData, ApiError> {
    let path = DocPath::message(conversation_id, message_id);
    let txn_path = path.clone();
    let user_id = user_id.to_string();
    let user_name = user_name.to_string();
    let option_id = option_id.to_string();

    let value = store
        .run_transaction(
            vec![path],
            Box::new(move |snap, writes| {
                let doc = snap.require(&txn_path)?;
                if doc.get("type") != Some(&json!("POLL")) {
                    return Err(StoreError::Invalid("message is not a poll".into()));
                }
                let mut poll: PollData = doc
                    .get("pollData")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .ok_or_else(|| StoreError::Invalid("poll message has no pollData".into()))?;

                let option = poll
                    .options
                    .iter_mut()
                    .find(|opt| opt.id == option_id)
                    .ok_or_else(|| StoreError::NotFound(format!("poll option {option_id}")))?;

                if let Some(idx) = option.voters.iter().position(|v| v.user_id == user_id) {
                    option.voters.remove(idx);
                    option.voter_ids.retain(|id| id != &user_id);
                } else {
                    option.voters.push(PollVoter {
                        user_id: user_id.clone(),
                        user_name: user_name.clone(),
                        voted_at: now_millis(),
                    });
                    option.voter_ids.push(user_id.clone());
                }

                // Derive every count from its voter list.
                for opt in &mut poll.options {
                    opt.vote_count = opt.voters.len() as i64;
                }

                writes.update(
                    &txn_path,
                    vec![(
                        "pollData.options".into(),
                        FieldOp::Set(serde_json::to_value(&poll.options)?),
                    )],
                );
                Ok(serde_json::to_value(&poll)?)
            }),
        )
        .await?;

    serde_json::from_value(value)
        .map_err(StoreError::from)
        .map_err(ApiError::from)
}
