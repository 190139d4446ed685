//! Health and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    realtime::Hub,
    store::{DocPath, DocumentStore},
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: i64,
    version: String,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    store: CheckStatus,
    websocket: WebSocketStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct WebSocketStatus {
    connected: usize,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
}

/// Liveness probe - the process is running
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Readiness probe - the store answers reads
pub async fn readiness(
    State(store): State<Arc<dyn DocumentStore>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = check_store(store.as_ref()).await;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadinessResponse { ready }))
}

/// GET /health - detailed health information
pub async fn health(
    State(store): State<Arc<dyn DocumentStore>>,
    State(hub): State<Arc<Hub>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = check_store(store.as_ref()).await;
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if store_ok { "ok" } else { "unhealthy" }.to_string(),
            timestamp: crate::models::now_millis(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                store: if store_ok {
                    CheckStatus::Healthy
                } else {
                    CheckStatus::Unhealthy
                },
                websocket: WebSocketStatus {
                    connected: hub.connection_count(),
                },
            },
        }),
    )
}

async fn check_store(store: &dyn DocumentStore) -> bool {
    store.get(&DocPath::new("health/probe")).await.is_ok()
}
