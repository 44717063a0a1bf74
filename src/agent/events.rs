//! Event protocol shared by both streaming hops
//!
//! Wire format is SSE: `event: <type>\ndata: <json>\n\n` with
//! `<type> ∈ {thinking, sources, token, done, error}`. The type tag lives in
//! the SSE event name; payloads are a closed set of structs so producers and
//! consumers are checked exhaustively.

use serde::Deserialize;
use serde::Serialize;

use crate::models::TicketDocument;

/// Business status codes shared by both tiers
pub mod codes {
    pub const SUCCESS: u32 = 0;
    /// Agent general error (catch-all)
    pub const AGENT_ERROR: u32 = 2000;
    pub const RAG_RETRIEVAL_ERROR: u32 = 2001;
    pub const LLM_CALL_ERROR: u32 = 2002;
    pub const NO_RELEVANT_RESULTS: u32 = 2005;
    pub const QUESTION_FORMAT_ERROR: u32 = 2006;
    /// Upstream exchange exceeded its deadline (relay-synthesized)
    pub const GATEWAY_TIMEOUT: u32 = 504;
    /// Transport or parse fault mid-stream (relay-synthesized)
    pub const INTERNAL_ERROR: u32 = 500;
}

/// Maximum number of source summaries carried on the wire
pub const MAX_SOURCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingStatus {
    Retrieving,
    Generating,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingPayload {
    pub status: ThinkingStatus,
    pub message: String,
}

/// Summary of one retrieved ticket as shown to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub ticket_id: String,
    pub issue_type: String,
    pub priority: String,
    pub status: String,
    /// Similarity score (`1 - distance`); absent when the index omits distance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl SourceSummary {
    pub fn from_document(doc: &TicketDocument) -> Self {
        Self {
            ticket_id: doc.metadata.ticket_id.clone(),
            issue_type: doc.metadata.issue_type.clone(),
            priority: doc.metadata.priority.clone(),
            status: doc.metadata.status.clone(),
            score: doc.score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesPayload {
    /// Top sources, capped at [`MAX_SOURCES`]
    pub sources: Vec<SourceSummary>,
    /// Total number of retrieved documents before capping
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMetadata {
    /// Wall-clock seconds for the whole exchange, rounded to 2 decimals
    pub query_time: f64,
    pub retrieved_docs: usize,
    pub model: String,
    pub embed_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonePayload {
    /// Full accumulated answer; the relay's augmented re-emission omits it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub metadata: AnswerMetadata,
    /// Persisted assistant message id, set only by the relay tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// One unit of the producer-side streaming protocol
#[derive(Debug, Clone)]
pub enum AnswerEvent {
    Thinking(ThinkingPayload),
    Sources(SourcesPayload),
    Token(TokenPayload),
    Done(DonePayload),
    Error(ErrorPayload),
}

impl AnswerEvent {
    pub fn thinking_retrieving() -> Self {
        Self::Thinking(ThinkingPayload {
            status: ThinkingStatus::Retrieving,
            message: "Searching related tickets...".to_string(),
        })
    }

    pub fn thinking_generating() -> Self {
        Self::Thinking(ThinkingPayload {
            status: ThinkingStatus::Generating,
            message: "Drafting a resolution...".to_string(),
        })
    }

    pub fn token(fragment: impl Into<String>) -> Self {
        Self::Token(TokenPayload {
            token: fragment.into(),
        })
    }

    pub fn error(code: u32, msg: impl Into<String>, detail: Option<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            msg: msg.into(),
            error_detail: detail,
        })
    }

    /// SSE event name for this variant
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Thinking(_) => "thinking",
            Self::Sources(_) => "sources",
            Self::Token(_) => "token",
            Self::Done(_) => "done",
            Self::Error(_) => "error",
        }
    }

    /// `Done` and `Error` end an event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }

    /// JSON payload for the `data:` field
    pub fn data_json(&self) -> crate::Result<String> {
        let json = match self {
            Self::Thinking(p) => serde_json::to_string(p)?,
            Self::Sources(p) => serde_json::to_string(p)?,
            Self::Token(p) => serde_json::to_string(p)?,
            Self::Done(p) => serde_json::to_string(p)?,
            Self::Error(p) => serde_json::to_string(p)?,
        };
        Ok(json)
    }

    /// Encode as one complete SSE frame
    pub fn to_sse_frame(&self) -> crate::Result<String> {
        Ok(format!(
            "event: {}\ndata: {}\n\n",
            self.event_name(),
            self.data_json()?
        ))
    }

    /// Decode from an SSE event name and data payload.
    ///
    /// Unknown event names and payloads that do not match the named variant
    /// are malformed frames.
    pub fn parse(event: &str, data: &str) -> crate::Result<Self> {
        let parsed = match event {
            "thinking" => Self::Thinking(serde_json::from_str(data)?),
            "sources" => Self::Sources(serde_json::from_str(data)?),
            "token" => Self::Token(serde_json::from_str(data)?),
            "done" => Self::Done(serde_json::from_str(data)?),
            "error" => Self::Error(serde_json::from_str(data)?),
            other => {
                return Err(crate::TicketRagError::Agent(format!(
                    "unknown event type: {other}"
                )))
            }
        };
        Ok(parsed)
    }
}

/// Typed fault produced by the engine, carrying its business code.
///
/// Only the outermost boundary converts unanticipated faults into the
/// catch-all `AGENT_ERROR`.
#[derive(Debug, Clone)]
pub struct EngineFault {
    pub code: u32,
    pub msg: String,
    pub detail: Option<String>,
}

impl EngineFault {
    pub fn question_format() -> Self {
        Self {
            code: codes::QUESTION_FORMAT_ERROR,
            msg: "Question must not be empty".to_string(),
            detail: None,
        }
    }

    pub fn retrieval(detail: impl Into<String>) -> Self {
        Self {
            code: codes::RAG_RETRIEVAL_ERROR,
            msg: "Vector retrieval failed".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn no_results() -> Self {
        Self {
            code: codes::NO_RELEVANT_RESULTS,
            msg: "No related ticket records found".to_string(),
            detail: None,
        }
    }

    pub fn llm(detail: impl Into<String>) -> Self {
        Self {
            code: codes::LLM_CALL_ERROR,
            msg: "AI model call failed".to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: codes::AGENT_ERROR,
            msg: "Agent service error".to_string(),
            detail: Some(detail.into()),
        }
    }
}

impl From<EngineFault> for AnswerEvent {
    fn from(fault: EngineFault) -> Self {
        Self::Error(ErrorPayload {
            code: fault.code,
            msg: fault.msg,
            error_detail: fault.detail,
        })
    }
}

impl std::fmt::Display for EngineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} (code {}): {}", self.msg, self.code, detail),
            None => write!(f, "{} (code {})", self.msg, self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TicketMetadata;

    fn doc(distance: f32) -> TicketDocument {
        TicketDocument {
            text: "Ticket body".to_string(),
            metadata: TicketMetadata {
                ticket_id: "TK-1001".to_string(),
                issue_type: "logistics".to_string(),
                priority: "high".to_string(),
                status: "resolved".to_string(),
            },
            distance: Some(distance),
        }
    }

    #[test]
    fn test_source_scores_follow_distances() {
        let distances = [0.1_f32, 0.2, 0.4];
        let scores: Vec<f32> = distances
            .iter()
            .map(|&d| SourceSummary::from_document(&doc(d)).score.unwrap())
            .collect();
        assert!((scores[0] - 0.9).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
        assert!((scores[2] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_sse_frame_shape() {
        let frame = AnswerEvent::token("hel").to_sse_frame().unwrap();
        assert_eq!(frame, "event: token\ndata: {\"token\":\"hel\"}\n\n");
    }

    #[test]
    fn test_parse_round_trip() {
        let original = AnswerEvent::Sources(SourcesPayload {
            sources: vec![SourceSummary::from_document(&doc(0.25))],
            count: 7,
        });
        let parsed =
            AnswerEvent::parse(original.event_name(), &original.data_json().unwrap()).unwrap();
        match parsed {
            AnswerEvent::Sources(p) => {
                assert_eq!(p.count, 7);
                assert_eq!(p.sources[0].ticket_id, "TK-1001");
                assert!((p.sources[0].score.unwrap() - 0.75).abs() < 1e-6);
            }
            other => panic!("unexpected variant: {}", other.event_name()),
        }
    }

    #[test]
    fn test_unknown_event_name_is_malformed() {
        assert!(AnswerEvent::parse("progress", "{}").is_err());
        assert!(AnswerEvent::parse("done", "not json").is_err());
    }

    #[test]
    fn test_terminal_detection() {
        assert!(!AnswerEvent::thinking_retrieving().is_terminal());
        assert!(!AnswerEvent::token("x").is_terminal());
        assert!(AnswerEvent::error(codes::AGENT_ERROR, "boom", None).is_terminal());
        let done = AnswerEvent::Done(DonePayload {
            answer: Some("ok".to_string()),
            metadata: AnswerMetadata {
                query_time: 0.5,
                retrieved_docs: 1,
                model: "m".to_string(),
                embed_model: "e".to_string(),
            },
            message_id: None,
        });
        assert!(done.is_terminal());
    }

    #[test]
    fn test_done_payload_optional_fields_omitted() {
        let done = DonePayload {
            answer: None,
            metadata: AnswerMetadata {
                query_time: 1.2,
                retrieved_docs: 3,
                model: "m".to_string(),
                embed_model: "e".to_string(),
            },
            message_id: Some("42".to_string()),
        };
        let json = serde_json::to_string(&done).unwrap();
        assert!(!json.contains("answer"));
        assert!(json.contains("\"message_id\":\"42\""));
    }
}
