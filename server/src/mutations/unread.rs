//! Unread counters
//!
//! On message send, each recipient's counter is bumped with an atomic
//! per-field increment rather than a read-modify-write of the whole map, so
//! two messages landing concurrently cannot lose an update. Mark-seen
//! resets the caller's own counter to zero unconditionally; the field is
//! self-owned, so last-writer-wins is acceptable there.

use serde_json::json;

use crate::store::{DocPath, DocumentStore, FieldOp, StoreError};

/// Increment `unreadCounts.<member>` by one for every member except the
/// sender.
pub async fn increment_unread(
    store: &dyn DocumentStore,
    conversation_id: &str,
    member_ids: &[String],
    sender_id: &str,
) -> Result<(), StoreError> {
    let ops: Vec<(String, FieldOp)> = member_ids
        .iter()
        .filter(|member| member.as_str() != sender_id)
        .map(|member| (format!("unreadCounts.{member}"), FieldOp::Increment(1)))
        .collect();
    if ops.is_empty() {
        return Ok(());
    }
    store
        .update(&DocPath::conversation(conversation_id), ops)
        .await
}

/// Reset the caller's own unread counter to zero.
pub async fn reset_unread(
    store: &dyn DocumentStore,
    conversation_id: &str,
    user_id: &str,
) -> Result<(), StoreError> {
    store
        .update(
            &DocPath::conversation(conversation_id),
            vec![(format!("unreadCounts.{user_id}"), FieldOp::Set(json!(0)))],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn store_with_conversation(members: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                &DocPath::conversation("c1"),
                json!({"memberIds": members, "unreadCounts": {}}),
            )
            .await
            .unwrap();
        store
    }

    fn members(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn sender_counter_is_untouched() {
        let store = store_with_conversation(&["x", "y", "z"]).await;
        increment_unread(&store, "c1", &members(&["x", "y", "z"]), "x")
            .await
            .unwrap();

        let doc = store.get(&DocPath::conversation("c1")).await.unwrap().unwrap();
        assert!(doc["unreadCounts"].get("x").is_none());
        assert_eq!(doc["unreadCounts"]["y"], 1);
        assert_eq!(doc["unreadCounts"]["z"], 1);
    }

    #[tokio::test]
    async fn reset_zeroes_only_the_caller() {
        let store = store_with_conversation(&["x", "y"]).await;
        increment_unread(&store, "c1", &members(&["x", "y"]), "x")
            .await
            .unwrap();
        increment_unread(&store, "c1", &members(&["x", "y"]), "y")
            .await
            .unwrap();

        reset_unread(&store, "c1", "y").await.unwrap();
        let doc = store.get(&DocPath::conversation("c1")).await.unwrap().unwrap();
        assert_eq!(doc["unreadCounts"]["y"], 0);
        assert_eq!(doc["unreadCounts"]["x"], 1);
    }

    #[tokio::test]
    async fn counters_never_go_negative() {
        let store = store_with_conversation(&["x", "y"]).await;
        reset_unread(&store, "c1", "y").await.unwrap();
        reset_unread(&store, "c1", "y").await.unwrap();

        let doc = store.get(&DocPath::conversation("c1")).await.unwrap().unwrap();
        assert_eq!(doc["unreadCounts"]["y"], 0);
    }

    #[tokio::test]
    async fn solo_conversation_is_a_noop() {
        let store = store_with_conversation(&["x"]).await;
        increment_unread(&store, "c1", &members(&["x"]), "x")
            .await
            .unwrap();
        let doc = store.get(&DocPath::conversation("c1")).await.unwrap().unwrap();
        assert_eq!(doc["unreadCounts"], json!({}));
    }
}
