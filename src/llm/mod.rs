//! LLM text generation module
//!
//! Wraps an Ollama-style generation endpoint behind the [`TextGenerator`]
//! capability, with both a blocking call and a token-fragment stream.

pub mod streaming;

pub use streaming::StreamingResponse;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::TicketRagError;

/// Capability that maps a prompt to generated text, optionally as a stream
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the full answer in one call
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate the answer as a lazy sequence of text fragments
    async fn generate_stream(&self, prompt: &str) -> Result<StreamingResponse>;

    /// Model identifier, reported in answer metadata
    fn model(&self) -> &str;
}

/// LLM generation service over an Ollama-compatible HTTP API
pub struct LlmService {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    client: Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl LlmService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: config.llm.endpoint.clone(),
            model: config.llm.model.clone(),
            api_key: config.llm.api_key.clone(),
            temperature: config.llm.temperature,
            client,
        })
    }

    fn request(&self, prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/api/generate", self.endpoint);
        debug!("Calling LLM API: {} (stream: {})", url, stream);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder.json(&GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        })
    }
}

#[async_trait]
impl TextGenerator for LlmService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .request(prompt, false)
            .send()
            .await
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TicketRagError::Llm(format!(
                "LLM API error ({status}): {error_text}"
            )));
        }

        let chunk: GenerateChunk = response
            .json()
            .await
            .map_err(|e| TicketRagError::Llm(format!("Failed to parse response: {e}")))?;

        Ok(chunk.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<StreamingResponse> {
        let response = self
            .request(prompt, true)
            .send()
            .await
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TicketRagError::Llm(format!(
                "LLM API error ({status}): {error_text}"
            )));
        }

        let mut bytes = response.bytes_stream();

        // The API emits one JSON object per line; forward each `response`
        // fragment in arrival order, never batching across fragments.
        let stream = async_stream::try_stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| TicketRagError::Llm(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let parsed: GenerateChunk = serde_json::from_str(line)
                        .map_err(|e| TicketRagError::Llm(format!("bad stream chunk: {e}")))?;
                    if !parsed.response.is_empty() {
                        yield parsed.response;
                    }
                    if parsed.done {
                        return;
                    }
                }
            }
        };

        Ok(StreamingResponse::new(Box::pin(stream)))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
