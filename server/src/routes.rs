//! Application router

use axum::{
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    handlers,
    health,
    middleware::{rate_limit_middleware, RateLimiter},
    realtime::websocket,
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let limiter = RateLimiter::per_minute(state.config.rate_limit_per_minute);

    let api = Router::new()
        // Messages
        .route("/messages", post(handlers::messages::send_message))
        .route(
            "/messages/{message_id}",
            put(handlers::messages::update_message).delete(handlers::messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            post(handlers::reactions::set_reaction).delete(handlers::reactions::clear_reactions),
        )
        .route(
            "/messages/{message_id}/poll/vote",
            post(handlers::polls::vote),
        )
        // Conversations
        .route(
            "/conversations",
            get(handlers::conversations::list_conversations)
                .post(handlers::conversations::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}",
            put(handlers::conversations::update_conversation)
                .delete(handlers::conversations::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(handlers::messages::list_messages),
        )
        .route(
            "/conversations/{conversation_id}/members",
            post(handlers::conversations::add_member),
        )
        .route(
            "/conversations/{conversation_id}/members/{user_id}",
            delete(handlers::conversations::remove_member),
        )
        .route(
            "/conversations/{conversation_id}/leave",
            post(handlers::conversations::leave_conversation),
        )
        .route(
            "/conversations/{conversation_id}/admins",
            post(handlers::conversations::set_admin),
        )
        .route(
            "/conversations/{conversation_id}/seen",
            post(handlers::conversations::mark_seen),
        )
        // Friends
        .route("/friends", get(handlers::friends::list_friends))
        .route(
            "/friends/requests",
            get(handlers::friends::list_requests).post(handlers::friends::send_request),
        )
        .route(
            "/friends/requests/{request_id}",
            put(handlers::friends::respond_request),
        )
        .route(
            "/friends/{friend_id}",
            delete(handlers::friends::remove_friend),
        )
        // Users
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user).put(handlers::users::update_user),
        )
        .route("/users/{user_id}/status", post(handlers::users::set_status))
        .route("/users/{user_id}/ban", post(handlers::users::ban_user))
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/ws", get(websocket::ws_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.iter().any(|origin| origin == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
