//! Agent service handlers: streaming answers and non-streaming chat

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::Sse;
use axum::Json;
use futures::Stream;
use futures::StreamExt;
use tracing::info;

use crate::agent::events::AnswerEvent;
use crate::api::handlers::AgentState;
use crate::api::types::ApiEnvelope;
use crate::api::types::ChatResponse;
use crate::api::types::QuestionRequest;
use crate::api::types::ServiceDescriptor;

/// Service descriptor (GET /)
pub async fn describe() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: "ticketrag-agent".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec!["POST /stream".to_string(), "POST /chat".to_string()],
    })
}

fn to_sse_event(event: &AnswerEvent) -> Event {
    let data = event
        .data_json()
        .unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.event_name()).data(data)
}

/// Streaming question answering (POST /stream)
pub async fn stream(
    State(state): State<AgentState>,
    Json(request): Json<QuestionRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("POST /stream ({} chars)", request.question.len());

    let events = Arc::clone(&state.engine)
        .ask_stream(request.question)
        .map(|event| Ok(to_sse_event(&event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Non-streaming question answering (POST /chat)
pub async fn chat(
    State(state): State<AgentState>,
    Json(request): Json<QuestionRequest>,
) -> Json<ApiEnvelope<ChatResponse>> {
    info!("POST /chat ({} chars)", request.question.len());

    match state.engine.ask(&request.question).await {
        Ok(reply) => Json(ApiEnvelope::success(ChatResponse {
            answer: reply.answer,
            sources: reply.sources,
            metadata: reply.metadata,
        })),
        Err(fault) => Json(ApiEnvelope::error(fault.code, fault.msg)),
    }
}
