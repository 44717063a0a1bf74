//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers;
use super::handlers::AgentState;
use super::handlers::RelayState;

/// Agent service router (mounted at the server root)
pub fn agent_routes(state: AgentState) -> Router {
    Router::new()
        .route("/", get(handlers::agent::describe))
        .route("/stream", post(handlers::agent::stream))
        .route("/chat", post(handlers::agent::chat))
        .with_state(state)
}

/// Relay service router (nested under /api)
pub fn relay_routes(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/conversations",
            post(handlers::conversations::create_conversation)
                .get(handlers::conversations::list_conversations),
        )
        .route(
            "/conversations/:id",
            get(handlers::conversations::get_conversation)
                .put(handlers::conversations::update_conversation),
        )
        .route(
            "/conversations/:id/delete",
            post(handlers::conversations::delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(handlers::conversations::list_messages),
        )
        .route(
            "/conversations/messages/stream",
            post(handlers::conversations::stream_message),
        )
        .with_state(state)
}
