//! Prometheus metrics

use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_gauge!(
            "ws_connections_active",
            "Number of live WebSocket connections"
        );
        metrics::describe_counter!(
            "ws_events_emitted_total",
            "Total events emitted to rooms, labeled by event name"
        );
        metrics::describe_counter!("messages_sent_total", "Total messages sent");
        metrics::describe_counter!(
            "store_txn_retries_total",
            "Store transactions retried after a read-set conflict"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

/// Handler for the Prometheus metrics endpoint
pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}
