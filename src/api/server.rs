//! HTTP server implementation

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing::warn;

use crate::agent::AnswerEngine;
use crate::api::handlers::AgentState;
use crate::api::handlers::RelayState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::database::Database;
use crate::llm::LlmService;
use crate::relay::AgentClient;
use crate::relay::RelayOrchestrator;
use crate::retrieval::RetrievalClient;
use crate::Result;

fn apply_layers(mut app: Router, enable_cors: bool) -> Router {
    app = app
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    app
}

/// Start the agent service: the producer side of the streaming pipeline
pub async fn serve_agent(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("Starting ticketrag agent service...");

    let retriever = Arc::new(RetrievalClient::new(config)?);
    let generator = Arc::new(LlmService::new(config)?);
    let engine = Arc::new(AnswerEngine::from_config(config, retriever, generator));

    let app = apply_layers(routes::agent_routes(AgentState { engine }), enable_cors);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Agent service listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /        - Service descriptor");
    info!("  POST /stream  - Streaming question answering (SSE)");
    info!("  POST /chat    - Non-streaming question answering");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the relay service: conversation persistence plus the second
/// streaming hop to the client
pub async fn serve_relay(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("Starting ticketrag relay service...");

    let database = Database::from_config(config).await?;
    if !database.is_schema_initialized().await? {
        warn!("Conversation schema not found; run `init-schema` before serving traffic");
    }

    let store: Arc<dyn crate::database::ConversationStore> = Arc::new(database);
    let gateway = Arc::new(AgentClient::new(config)?);
    let relay = Arc::new(RelayOrchestrator::new(
        Arc::clone(&store),
        gateway,
        config.exchange_timeout(),
        config.title_timeout(),
    ));

    let app = apply_layers(
        Router::new().nest("/api", routes::relay_routes(RelayState { store, relay })),
        enable_cors,
    );

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Relay service listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health                          - Health check");
    info!("  POST /api/conversations                   - Create conversation");
    info!("  GET  /api/conversations                   - List conversations");
    info!("  GET  /api/conversations/:id               - Get conversation");
    info!("  PUT  /api/conversations/:id               - Rename conversation");
    info!("  POST /api/conversations/:id/delete        - Delete conversation");
    info!("  GET  /api/conversations/:id/messages      - List messages");
    info!("  POST /api/conversations/messages/stream   - Streaming exchange (SSE)");

    axum::serve(listener, app).await?;
    Ok(())
}
