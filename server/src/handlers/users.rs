//! User endpoints: profiles, self-reported presence, moderation

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::now_millis,
    realtime::Hub,
    store::{DocPath, DocumentStore, FieldOp},
};

/// GET /api/users/{user_id}
pub async fn get_user(
    State(store): State<Arc<dyn DocumentStore>>,
    _auth_user: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut doc = store
        .get(&DocPath::user(&user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {user_id}")))?;
    if let Some(map) = doc.as_object_mut() {
        map.insert("id".into(), json!(user_id));
    }
    Ok(Json(doc))
}

const PROFILE_FIELDS: &[&str] = &["name", "bio", "avatarUrl", "phone"];

/// PUT /api/users/{user_id} — self or admin
pub async fn update_user(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
    Path(user_id): Path<String>,
    Json(updates): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    if auth_user.user_id != user_id && !auth_user.is_admin() {
        return Err(ApiError::Forbidden("cannot edit another user".into()));
    }

    let ops: Vec<(String, FieldOp)> = updates
        .into_iter()
        .filter(|(field, _)| PROFILE_FIELDS.contains(&field.as_str()))
        .map(|(field, value)| (field, FieldOp::Set(value)))
        .collect();
    if ops.is_empty() {
        return Err(ApiError::Validation("no updatable fields provided".into()));
    }

    store.update(&DocPath::user(&user_id), ops).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatusInput {
    pub is_online: bool,
}

/// POST /api/users/{user_id}/status — self-reported presence, e.g. an app
/// moving to the background. Routed through the presence tracker so friends
/// get the same `friend_status_changed` fan-out as socket transitions.
pub async fn set_status(
    State(hub): State<Arc<Hub>>,
    auth_user: AuthUser,
    Path(user_id): Path<String>,
    Json(input): Json<SetStatusInput>,
) -> Result<Json<Value>, ApiError> {
    if auth_user.user_id != user_id {
        return Err(ApiError::Forbidden(
            "cannot set another user's status".into(),
        ));
    }

    if input.is_online {
        hub.presence().set_online(&user_id).await?;
    } else {
        hub.presence().set_offline(&user_id).await?;
    }
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct BanInput {
    pub banned: bool,
}

/// POST /api/users/{user_id}/ban — admin only. Banning also forces logout:
/// tokens issued before `forceLogoutAt` stop authenticating.
pub async fn ban_user(
    State(store): State<Arc<dyn DocumentStore>>,
    auth_user: AuthUser,
    Path(user_id): Path<String>,
    Json(input): Json<BanInput>,
) -> Result<Json<Value>, ApiError> {
    if !auth_user.is_admin() {
        return Err(ApiError::Forbidden("admin access required".into()));
    }

    let now = now_millis();
    let mut ops = vec![("isBanned".to_string(), FieldOp::Set(json!(input.banned)))];
    if input.banned {
        ops.push(("bannedAt".into(), FieldOp::Set(json!(now))));
        ops.push(("forceLogoutAt".into(), FieldOp::Set(json!(now))));
        ops.push(("isOnline".into(), FieldOp::Set(json!(false))));
    } else {
        ops.push(("bannedAt".into(), FieldOp::Delete));
    }
    store.update(&DocPath::user(&user_id), ops).await?;

    info!(user = %user_id, banned = input.banned, "ban state changed");
    Ok(Json(json!({ "success": true })))
}
