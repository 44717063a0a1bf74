//! HTTP transport to the agent service
//!
//! The relay talks to the agent through the [`AgentGateway`] capability so
//! the orchestrator can be exercised against scripted streams in tests. The
//! live implementation speaks SSE over reqwest.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::agent::events::AnswerEvent;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::TicketRagError;
use crate::relay::sse::SseFrameDecoder;

/// One unit read from the upstream exchange
#[derive(Debug)]
pub enum StreamItem {
    /// A well-formed protocol event
    Event(AnswerEvent),
    /// A frame that arrived but did not parse; carries the raw event name
    Malformed { event: String, detail: String },
    /// The transport failed; the stream ends after this item
    Transport(String),
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Capability covering both agent entry points
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Open the streaming question exchange
    async fn open_stream(&self, question: &str) -> Result<EventStream>;

    /// Non-streaming completion, used by title synthesis
    async fn completion(&self, question: &str) -> Result<String>;
}

/// Live gateway over the agent service's HTTP API
pub struct AgentClient {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    code: u32,
    msg: String,
    #[serde(default)]
    data: Option<ChatData>,
}

#[derive(Deserialize)]
struct ChatData {
    answer: String,
}

impl AgentClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        // No overall request timeout here; the orchestrator owns the
        // exchange deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: config.agent_endpoint().to_string(),
            client,
        })
    }
}

#[async_trait]
impl AgentGateway for AgentClient {
    async fn open_stream(&self, question: &str) -> Result<EventStream> {
        let url = format!("{}/stream", self.endpoint);
        debug!("Opening agent stream: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&QuestionRequest { question })
            .send()
            .await
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TicketRagError::Agent(format!(
                "agent stream rejected: {}",
                response.status()
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseFrameDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield StreamItem::Transport(e.to_string());
                        return;
                    }
                };
                for frame in decoder.feed(&chunk) {
                    match AnswerEvent::parse(&frame.event, &frame.data) {
                        Ok(event) => yield StreamItem::Event(event),
                        Err(e) => {
                            warn!("Malformed agent frame ({}): {}", frame.event, e);
                            yield StreamItem::Malformed {
                                event: frame.event,
                                detail: e.to_string(),
                            };
                        }
                    }
                }
            }
            if !decoder.residue().is_empty() {
                yield StreamItem::Transport("stream ended mid-frame".to_string());
            }
        };

        Ok(Box::pin(stream))
    }

    async fn completion(&self, question: &str) -> Result<String> {
        let url = format!("{}/chat", self.endpoint);
        debug!("Calling agent completion: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&QuestionRequest { question })
            .send()
            .await
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TicketRagError::Agent(format!(
                "agent completion rejected: {}",
                response.status()
            )));
        }

        let envelope: ChatEnvelope = response
            .json()
            .await
            .map_err(|e| TicketRagError::Agent(format!("bad completion response: {e}")))?;

        if envelope.code != 0 {
            return Err(TicketRagError::Agent(format!(
                "agent completion failed ({}): {}",
                envelope.code, envelope.msg
            )));
        }

        envelope
            .data
            .map(|d| d.answer)
            .ok_or_else(|| TicketRagError::Agent("completion succeeded without data".to_string()))
    }
}
