/// API request handlers
use std::sync::Arc;

use axum::Json;

use crate::agent::AnswerEngine;
use crate::api::types::ApiEnvelope;
use crate::api::types::HealthResponse;
use crate::database::ConversationStore;
use crate::relay::RelayOrchestrator;

pub mod agent;
pub mod conversations;

/// Shared state of the agent service
#[derive(Clone)]
pub struct AgentState {
    pub engine: Arc<AnswerEngine>,
}

/// Shared state of the relay service
#[derive(Clone)]
pub struct RelayState {
    pub store: Arc<dyn ConversationStore>,
    pub relay: Arc<RelayOrchestrator>,
}

/// Health check handler
pub async fn health() -> Json<ApiEnvelope<HealthResponse>> {
    Json(ApiEnvelope::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
