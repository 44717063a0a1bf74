//! API request and response types

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::agent::events::AnswerMetadata;
use crate::agent::events::SourceSummary;
use crate::models::Conversation;
use crate::models::Message;

/// Standard non-streaming response envelope: `code` 0 on success, a business
/// or HTTP-style code otherwise
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub code: u32,
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: u32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Agent service root descriptor
#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

/// Question body shared by the agent's stream and chat endpoints
#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

/// Non-streaming answer payload
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceSummary>,
    pub metadata: AnswerMetadata,
}

/// Conversation creation request; title defaults when omitted
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// Conversation rename request
#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: String,
}

/// Streaming exchange request against an existing conversation
#[derive(Debug, Deserialize)]
pub struct StreamMessageRequest {
    pub conversation_id: i64,
    pub content: String,
}

/// List pagination parameters
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// Conversation representation on the wire
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// Message representation on the wire
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}
