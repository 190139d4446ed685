use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wren_server::{
    auth,
    config::Config,
    metrics,
    routes,
    state::AppState,
    store::{DocumentStore, MemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wren_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wren chat server");

    let config = Config::from_env();
    let port = config.port;

    // Initialize metrics
    let metrics_recorder = metrics::MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();
    tracing::info!("Metrics initialized");

    // The in-process store; a production deployment substitutes a remote
    // DocumentStore implementation here.
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let verifier = auth::default_verifier(&config.jwt_secret);
    let app_state = AppState::new(store, verifier, config);
    tracing::info!("Realtime hub initialized");

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(metrics_handle);

    let app = routes::router(app_state).merge(metrics_router);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
