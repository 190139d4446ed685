//! Token verification and request authentication
//!
//! Token verification itself is an external collaborator behind the
//! [`TokenVerifier`] trait: the default implementation checks HS256 JWTs,
//! and tests plug in a static map. Account-state checks (banned accounts,
//! forced logout) are applied on top of the verified claims for both the
//! HTTP surface and the WebSocket handshake.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::ApiError,
    models::UserRecord,
    state::AppState,
    store::{DocPath, DocumentStore},
};

/// Verified token claims: who, and when the token was issued
/// (epoch milliseconds, compared against `forceLogoutAt`).
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: String,
    pub issued_at: i64,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<TokenClaims, ApiError>;
}

/// HS256 JWT verifier (`sub` = user id, `iat` in seconds).
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: String,
    iat: i64,
    #[allow(dead_code)]
    exp: i64,
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify_token(&self, token: &str) -> Result<TokenClaims, ApiError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| ApiError::Auth(format!("invalid token: {e}")))?;
        Ok(TokenClaims {
            user_id: data.claims.sub,
            issued_at: data.claims.iat * 1000,
        })
    }
}

/// Fixed token → claims map for tests and local development.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: RwLock<HashMap<String, TokenClaims>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, token: &str, user_id: &str) {
        self.tokens.write().insert(
            token.to_string(),
            TokenClaims {
                user_id: user_id.to_string(),
                issued_at: crate::models::now_millis(),
            },
        );
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify_token(&self, token: &str) -> Result<TokenClaims, ApiError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::Auth("invalid token".into()))
    }
}

/// An authenticated caller, after token verification and account checks.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub claims: TokenClaims,
    /// Role from the user record (`admin` unlocks moderation endpoints).
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Verify a bearer token and enforce account state.
///
/// Rejects banned accounts and tokens issued before the user's
/// `forceLogoutAt` mark. A missing user record is not an error; account
/// creation is owned by the auth collaborator.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    store: &dyn DocumentStore,
    token: &str,
) -> Result<AuthUser, ApiError> {
    let claims = verifier.verify_token(token).await?;

    let mut role = None;
    if let Some(doc) = store.get(&DocPath::user(&claims.user_id)).await? {
        let user: UserRecord = serde_json::from_value(doc)
            .map_err(|e| ApiError::Auth(format!("malformed user record: {e}")))?;
        if user.is_banned {
            return Err(ApiError::Forbidden("account banned".into()));
        }
        if let Some(force_logout_at) = user.force_logout_at {
            if force_logout_at > claims.issued_at {
                return Err(ApiError::Auth("session terminated".into()));
            }
        }
        role = user.role;
    }

    Ok(AuthUser {
        user_id: claims.user_id.clone(),
        claims,
        role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Auth("no token provided".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Auth("expected 'Bearer <token>'".into()))?;

        authenticate(state.verifier.as_ref(), state.store.as_ref(), token).await
    }
}

/// Shared constructor used by `main` so the verifier choice stays in one place.
pub fn default_verifier(jwt_secret: &str) -> Arc<dyn TokenVerifier> {
    Arc::new(JwtVerifier::new(jwt_secret))
}
