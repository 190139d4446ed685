//! Composite application state

use axum::extract::FromRef;
use std::sync::Arc;

use crate::{auth::TokenVerifier, config::Config, realtime::Hub, store::DocumentStore};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub hub: Arc<Hub>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn TokenVerifier>,
        config: Config,
    ) -> Self {
        let hub = Arc::new(Hub::new(
            store.clone(),
            verifier.clone(),
            config.max_connections_per_user,
        ));
        Self {
            store,
            hub,
            verifier,
            config: Arc::new(config),
        }
    }
}
