//! Relay service handlers: conversation CRUD and the streaming exchange
//!
//! Caller identity arrives as an `x-user-id` header; every storage access is
//! scoped by it.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::Sse;
use axum::Json;
use futures::Stream;
use futures::StreamExt;
use tracing::error;
use tracing::info;

use crate::api::handlers::RelayState;
use crate::api::types::ApiEnvelope;
use crate::api::types::ConversationResponse;
use crate::api::types::CreateConversationRequest;
use crate::api::types::MessageResponse;
use crate::api::types::Pagination;
use crate::api::types::StreamMessageRequest;
use crate::api::types::UpdateConversationRequest;
use crate::errors::TicketRagError;

const DEFAULT_TITLE: &str = "New conversation";

type ApiError = (StatusCode, Json<ApiEnvelope<()>>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiEnvelope::error(status.as_u16() as u32, msg)),
    )
}

fn not_found(id: i64) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("conversation {id} not found"))
}

fn internal(e: &TicketRagError) -> ApiError {
    error!("Storage operation failed: {e}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// Caller identity from the `x-user-id` header
fn user_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing or invalid x-user-id header"))
}

/// POST /conversations
pub async fn create_conversation(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<CreateConversationRequest>,
) -> Result<Json<ApiEnvelope<ConversationResponse>>, ApiError> {
    let user_id = user_id(&headers)?;
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let conversation = state
        .store
        .create_conversation(user_id, &title)
        .await
        .map_err(|e| internal(&e))?;

    info!("Created conversation {} for user {}", conversation.id, user_id);
    Ok(Json(ApiEnvelope::success(conversation.into())))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<ApiEnvelope<Vec<ConversationResponse>>>, ApiError> {
    let user_id = user_id(&headers)?;
    let conversations = state
        .store
        .list_conversations(user_id, page.limit, page.offset)
        .await
        .map_err(|e| internal(&e))?;

    Ok(Json(ApiEnvelope::success(
        conversations.into_iter().map(Into::into).collect(),
    )))
}

/// GET /conversations/:id
pub async fn get_conversation(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiEnvelope<ConversationResponse>>, ApiError> {
    let user_id = user_id(&headers)?;
    let conversation = state
        .store
        .get_conversation(id, user_id)
        .await
        .map_err(|e| internal(&e))?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(ApiEnvelope::success(conversation.into())))
}

/// PUT /conversations/:id
pub async fn update_conversation(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<UpdateConversationRequest>,
) -> Result<Json<ApiEnvelope<ConversationResponse>>, ApiError> {
    let user_id = user_id(&headers)?;
    if request.title.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "title must not be empty"));
    }

    let conversation = state
        .store
        .update_conversation_title(id, user_id, request.title.trim())
        .await
        .map_err(|e| internal(&e))?
        .ok_or_else(|| not_found(id))?;

    Ok(Json(ApiEnvelope::success(conversation.into())))
}

/// POST /conversations/:id/delete
pub async fn delete_conversation(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    let user_id = user_id(&headers)?;
    let deleted = state
        .store
        .delete_conversation(id, user_id)
        .await
        .map_err(|e| internal(&e))?;

    if !deleted {
        return Err(not_found(id));
    }
    info!("Deleted conversation {} for user {}", id, user_id);
    Ok(Json(ApiEnvelope::success(())))
}

/// GET /conversations/:id/messages
pub async fn list_messages(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Query(page): Query<Pagination>,
) -> Result<Json<ApiEnvelope<Vec<MessageResponse>>>, ApiError> {
    let user_id = user_id(&headers)?;
    // Ownership gate before touching the transcript
    state
        .store
        .get_conversation(id, user_id)
        .await
        .map_err(|e| internal(&e))?
        .ok_or_else(|| not_found(id))?;

    let messages = state
        .store
        .list_messages(id, page.limit, page.offset)
        .await
        .map_err(|e| internal(&e))?;

    Ok(Json(ApiEnvelope::success(
        messages.into_iter().map(Into::into).collect(),
    )))
}

/// POST /conversations/messages/stream
pub async fn stream_message(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<StreamMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user_id = user_id(&headers)?;
    if request.content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "content must not be empty"));
    }
    info!(
        "Streaming exchange on conversation {} for user {}",
        request.conversation_id, user_id
    );

    let stream = Arc::clone(&state.relay)
        .handle(request.conversation_id, user_id, request.content)
        .await
        .map_err(|e| match e {
            TicketRagError::ConversationNotFound(id) => not_found(id),
            other => internal(&other),
        })?;

    let events = stream.map(|event| {
        let data = event.data_json().unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.event_name()).data(data))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
