//! Reaction mutations
//!
//! The detailed per-user map (`reactionsDetailed`: user → type → occurrence
//! count) is the source of truth. Setting a reaction increments the count
//! for that user+type ("tap to increment", not a toggle); clearing removes
//! every entry for the user. Both the flat aggregate (`reactionCounts`) and
//! the backward-compatible primary view (`reactions`) are recomputed in
//! full from the detailed map on every mutation, inside one transaction
//! scoped to the message document.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::ApiError;
use crate::store::{DocPath, DocumentStore, FieldOp, StoreError};

type DetailedReactions = HashMap<String, HashMap<String, i64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionOutcome {
    pub reactions: HashMap<String, String>,
    pub reactions_detailed: DetailedReactions,
    pub reaction_counts: HashMap<String, i64>,
}

/// Add, increment, or clear a user's reaction on a message.
/// `reaction_type = None` removes all of the user's reactions.
pub async fn apply_reaction(
    store: &dyn DocumentStore,
    conversation_id: &str,
    message_id: &str,
    user_id: &str,
    reaction_type: Option<&str>,
) -> Result<ReactionOutcome, ApiError> {
    let path = DocPath::message(conversation_id, message_id);
    let txn_path = path.clone();
    let user_id = user_id.to_string();
    let reaction_type = reaction_type.map(str::to_string);

    let value = store
        .run_transaction(
            vec![path],
            Box::new(move |snap, writes| {
                let doc = snap.require(&txn_path)?;
                let mut detailed: DetailedReactions = doc
                    .get("reactionsDetailed")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();

                match &reaction_type {
                    Some(kind) => {
                        *detailed
                            .entry(user_id.clone())
                            .or_default()
                            .entry(kind.clone())
                            .or_insert(0) += 1;
                    }
                    None => {
                        detailed.remove(&user_id);
                    }
                }

                let (reactions, reaction_counts) = recompute_reaction_views(&detailed);
                writes.update(
                    &txn_path,
                    vec![
                        ("reactions".into(), FieldOp::Set(json!(reactions))),
                        ("reactionsDetailed".into(), FieldOp::Set(json!(detailed))),
                        ("reactionCounts".into(), FieldOp::Set(json!(reaction_counts))),
                    ],
                );

                Ok(json!(ReactionOutcome {
                    reactions,
                    reactions_detailed: detailed,
                    reaction_counts,
                }))
            }),
        )
        .await?;

    outcome_from(value)
}

/// Clear every reaction on a message, from every user.
pub async fn clear_all_reactions(
    store: &dyn DocumentStore,
    conversation_id: &str,
    message_id: &str,
) -> Result<ReactionOutcome, ApiError> {
    let path = DocPath::message(conversation_id, message_id);
    let txn_path = path.clone();

    let value = store
        .run_transaction(
            vec![path],
            Box::new(move |snap, writes| {
                snap.require(&txn_path)?;
                writes.update(
                    &txn_path,
                    vec![
                        ("reactions".into(), FieldOp::Set(json!({}))),
                        ("reactionsDetailed".into(), FieldOp::Set(json!({}))),
                        ("reactionCounts".into(), FieldOp::Set(json!({}))),
                    ],
                );
                Ok(json!(ReactionOutcome {
                    reactions: HashMap::new(),
                    reactions_detailed: HashMap::new(),
                    reaction_counts: HashMap::new(),
                }))
            }),
        )
        .await?;

    outcome_from(value)
}

fn outcome_from(value: Value) -> Result<ReactionOutcome, ApiError> {
    serde_json::from_value(value)
        .map_err(StoreError::from)
        .map_err(ApiError::from)
}

/// Recompute both derived views from the detailed map.
///
/// The aggregate counts the total occurrences per type; the primary view
/// maps each user to their highest-count type (ties broken by type name so
/// the result is deterministic). Entries with non-positive counts are
/// dropped from both.
pub fn recompute_reaction_views(
    detailed: &DetailedReactions,
) -> (HashMap<String, String>, HashMap<String, i64>) {
    let mut counts: HashMap<String, i64> = HashMap::new();
    let mut primary: HashMap<String, String> = HashMap::new();

    for (user_id, user_reactions) in detailed {
        let mut best: Option<(&str, i64)> = None;
        for (kind, &count) in user_reactions {
            if count <= 0 {
                continue;
            }
            *counts.entry(kind.clone()).or_insert(0) += count;
            let replace = match best {
                None => true,
                Some((best_kind, best_count)) => {
                    count > best_count || (count == best_count && kind.as_str() < best_kind)
                }
            };
            if replace {
                best = Some((kind.as_str(), count));
            }
        }
        if let Some((kind, _)) = best {
            primary.insert(user_id.clone(), kind.to_string());
        }
    }
    (primary, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn store_with_message() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                &DocPath::message("c1", "m1"),
                json!({
                    "conversationId": "c1",
                    "senderId": "u1",
                    "type": "TEXT",
                    "content": "hi",
                    "timestamp": 1,
                }),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn second_tap_accumulates() {
        let store = store_with_message().await;

        apply_reaction(&store, "c1", "m1", "u2", Some("heart"))
            .await
            .unwrap();
        let outcome = apply_reaction(&store, "c1", "m1", "u2", Some("heart"))
            .await
            .unwrap();

        assert_eq!(outcome.reactions_detailed["u2"]["heart"], 2);
        assert_eq!(outcome.reaction_counts["heart"], 2);
        assert_eq!(outcome.reactions["u2"], "heart");
    }

    #[tokio::test]
    async fn clearing_removes_full_occurrence_count() {
        let store = store_with_message().await;
        for _ in 0..3 {
            apply_reaction(&store, "c1", "m1", "u2", Some("heart"))
                .await
                .unwrap();
        }
        apply_reaction(&store, "c1", "m1", "u3", Some("heart"))
            .await
            .unwrap();

        let outcome = apply_reaction(&store, "c1", "m1", "u2", None).await.unwrap();
        assert!(outcome.reactions_detailed.get("u2").is_none());
        // u3's single heart remains; u2's three are gone in one step.
        assert_eq!(outcome.reaction_counts["heart"], 1);
    }

    #[tokio::test]
    async fn clearing_last_reactor_drops_the_type() {
        let store = store_with_message().await;
        apply_reaction(&store, "c1", "m1", "u2", Some("heart"))
            .await
            .unwrap();

        let outcome = apply_reaction(&store, "c1", "m1", "u2", None).await.unwrap();
        assert!(outcome.reaction_counts.is_empty());
        assert!(outcome.reactions.is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let store = MemoryStore::new();
        let err = apply_reaction(&store, "c1", "ghost", "u2", Some("heart"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn clear_all_empties_every_map() {
        let store = store_with_message().await;
        apply_reaction(&store, "c1", "m1", "u2", Some("heart"))
            .await
            .unwrap();
        apply_reaction(&store, "c1", "m1", "u3", Some("laugh"))
            .await
            .unwrap();

        clear_all_reactions(&store, "c1", "m1").await.unwrap();
        let doc = store
            .get(&DocPath::message("c1", "m1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["reactions"], json!({}));
        assert_eq!(doc["reactionsDetailed"], json!({}));
        assert_eq!(doc["reactionCounts"], json!({}));
    }

    #[test]
    fn aggregate_always_matches_detailed() {
        let mut detailed: DetailedReactions = HashMap::new();
        detailed.insert(
            "u1".into(),
            HashMap::from([("heart".into(), 2), ("laugh".into(), 5)]),
        );
        detailed.insert("u2".into(), HashMap::from([("heart".into(), 1)]));

        let (primary, counts) = recompute_reaction_views(&detailed);
        assert_eq!(counts["heart"], 3);
        assert_eq!(counts["laugh"], 5);
        assert_eq!(primary["u1"], "laugh");
        assert_eq!(primary["u2"], "heart");

        for (kind, total) in &counts {
            let sum: i64 = detailed
                .values()
                .filter_map(|user| user.get(kind))
                .sum();
            assert_eq!(sum, *total);
        }
    }
}
