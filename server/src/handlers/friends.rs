//! Friend endpoints: friend list, requests, removal
//!
//! Accepting a request adds each user to the other's friend set inside one
//! multi-document transaction, so the two friend lists cannot diverge.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use ulid::Ulid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{now_millis, FriendRequest, FriendRequestStatus, UserRecord},
    realtime::{Hub, ServerEvent},
    store::{DocPath, DocumentStore, FieldOp, Filter, StoreError},
};

/// GET /api/friends
pub async fn list_friends(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let friends = match store.get(&DocPath::user(&auth_user.user_id)).await? {
        Some(doc) => {
            let user: UserRecord = serde_json::from_value(doc).map_err(StoreError::from)?;
            user.friends
        }
        None => Vec::new(),
    };
    Ok(Json(json!({ "friends": friends })))
}

/// GET /api/friends/requests — pending requests addressed to the caller
pub async fn list_requests(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let results = store
        .query(
            "friendRequests",
            vec![
                Filter::eq("receiverId", auth_user.user_id),
                Filter::eq("status", "pending"),
            ],
            None,
            None,
        )
        .await?;

    let requests: Vec<Value> = results
        .into_iter()
        .map(|(id, mut fields)| {
            if let Some(map) = fields.as_object_mut() {
                map.insert("id".into(), json!(id));
            }
            fields
        })
        .collect();
    Ok(Json(json!({ "requests": requests })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequestInput {
    pub receiver_id: String,
}

/// POST /api/friends/requests
pub async fn send_request(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Json(input): Json<SendRequestInput>,
) -> Result<Json<Value>, ApiError> {
    if input.receiver_id == auth_user.user_id {
        return Err(ApiError::Validation("cannot befriend yourself".into()));
    }
    let receiver_doc = store
        .get(&DocPath::user(&input.receiver_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", input.receiver_id)))?;
    let receiver: UserRecord = serde_json::from_value(receiver_doc).map_err(StoreError::from)?;
    if receiver.friends.iter().any(|f| f == &auth_user.user_id) {
        return Err(ApiError::Conflict("already friends".into()));
    }

    let duplicates = store
        .query(
            "friendRequests",
            vec![
                Filter::eq("senderId", auth_user.user_id.clone()),
                Filter::eq("receiverId", input.receiver_id.clone()),
                Filter::eq("status", "pending"),
            ],
            None,
            Some(1),
        )
        .await?;
    if !duplicates.is_empty() {
        return Err(ApiError::Conflict("request already pending".into()));
    }

    let request = FriendRequest {
        sender_id: auth_user.user_id.clone(),
        receiver_id: input.receiver_id.clone(),
        status: FriendRequestStatus::Pending,
        created_at: now_millis(),
    };
    let request_id = Ulid::new().to_string();
    store
        .set(
            &DocPath::friend_request(&request_id),
            serde_json::to_value(&request).map_err(StoreError::from)?,
        )
        .await?;

    hub.dispatcher().emit_to_user(
        &input.receiver_id,
        ServerEvent::FriendRequestReceived {
            request_id: request_id.clone(),
            sender_id: auth_user.user_id,
            receiver_id: input.receiver_id.clone(),
        },
    );

    Ok(Json(json!({ "success": true, "requestId": request_id })))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Accept,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequestInput {
    pub action: RequestAction,
}

/// PUT /api/friends/requests/{request_id} — accept or reject, receiver only
pub async fn respond_request(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(request_id): Path<String>,
    Json(input): Json<RespondRequestInput>,
) -> Result<Json<Value>, ApiError> {
    let request_path = DocPath::friend_request(&request_id);
    let doc = store
        .get(&request_path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("friend request {request_id}")))?;
    let request: FriendRequest = serde_json::from_value(doc).map_err(StoreError::from)?;

    if request.receiver_id != auth_user.user_id {
        return Err(ApiError::Forbidden(
            "only the receiver can respond to a request".into(),
        ));
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(ApiError::Conflict("request already resolved".into()));
    }

    match input.action {
        RequestAction::Accept => {
            let sender_path = DocPath::user(&request.sender_id);
            let receiver_path = DocPath::user(&request.receiver_id);
            let txn_request_path = request_path.clone();
            let txn_sender = sender_path.clone();
            let txn_receiver = receiver_path.clone();
            let sender_id = request.sender_id.clone();
            let receiver_id = request.receiver_id.clone();

            // Both friend sets and the request flip in one atomic commit.
            store
                .run_transaction(
                    vec![sender_path, receiver_path, request_path],
                    Box::new(move |snap, writes| {
                        snap.require(&txn_sender)?;
                        snap.require(&txn_receiver)?;
                        snap.require(&txn_request_path)?;
                        writes.update(
                            &txn_sender,
                            vec![(
                                "friends".into(),
                                FieldOp::ArrayUnion(json!(receiver_id)),
                            )],
                        );
                        writes.update(
                            &txn_receiver,
                            vec![("friends".into(), FieldOp::ArrayUnion(json!(sender_id)))],
                        );
                        writes.update(
                            &txn_request_path,
                            vec![("status".into(), FieldOp::Set(json!("accepted")))],
                        );
                        Ok(Value::Null)
                    }),
                )
                .await?;

            let dispatcher = hub.dispatcher();
            dispatcher.emit_to_user(
                &request.sender_id,
                ServerEvent::FriendRequestAccepted {
                    request_id: request_id.clone(),
                    sender_id: request.sender_id.clone(),
                    receiver_id: request.receiver_id.clone(),
                },
            );
            dispatcher.emit_to_user(
                &request.sender_id,
                ServerEvent::FriendAdded {
                    user_id: request.sender_id.clone(),
                    friend_id: request.receiver_id.clone(),
                },
            );
            dispatcher.emit_to_user(
                &request.receiver_id,
                ServerEvent::FriendAdded {
                    user_id: request.receiver_id.clone(),
                    friend_id: request.sender_id.clone(),
                },
            );
            info!(request = %request_id, "friend request accepted");
        }
        RequestAction::Reject => {
            store
                .update(
                    &request_path,
                    vec![("status".into(), FieldOp::Set(json!("rejected")))],
                )
                .await?;
            hub.dispatcher().emit_to_user(
                &request.sender_id,
                ServerEvent::FriendRequestRejected {
                    request_id: request_id.clone(),
                    sender_id: request.sender_id.clone(),
                    receiver_id: request.receiver_id.clone(),
                },
            );
        }
    }

    Ok(Json(json!({ "success": true })))
}

/// DELETE /api/friends/{friend_id} — mutual removal
pub async fn remove_friend(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(friend_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user_path = DocPath::user(&auth_user.user_id);
    let friend_path = DocPath::user(&friend_id);
    let txn_user = user_path.clone();
    let txn_friend = friend_path.clone();
    let user_id = auth_user.user_id.clone();
    let other_id = friend_id.clone();

    store
        .run_transaction(
            vec![user_path, friend_path],
            Box::new(move |snap, writes| {
                snap.require(&txn_user)?;
                snap.require(&txn_friend)?;
                writes.update(
                    &txn_user,
                    vec![("friends".into(), FieldOp::ArrayRemove(json!(other_id)))],
                );
                writes.update(
                    &txn_friend,
                    vec![("friends".into(), FieldOp::ArrayRemove(json!(user_id)))],
                );
                Ok(Value::Null)
            }),
        )
        .await?;

    let dispatcher = hub.dispatcher();
    dispatcher.emit_to_user(
        &auth_user.user_id,
        ServerEvent::FriendRemoved {
            user_id: auth_user.user_id.clone(),
            friend_id: friend_id.clone(),
        },
    );
    dispatcher.emit_to_user(
        &friend_id,
        ServerEvent::FriendRemoved {
            user_id: friend_id.clone(),
            friend_id: auth_user.user_id,
        },
    );

    Ok(Json(json!({ "success": true })))
}
