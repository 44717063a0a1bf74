//! Producer state machine: question in, ordered event sequence out
//!
//! `Validating → Retrieving → (NoResults | Generating) → Streaming → Done`,
//! with `Error` reachable from every state. Every sequence ends in exactly one
//! terminal event.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use futures::StreamExt;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::agent::events::codes;
use crate::agent::events::AnswerEvent;
use crate::agent::events::AnswerMetadata;
use crate::agent::events::DonePayload;
use crate::agent::events::EngineFault;
use crate::agent::events::SourceSummary;
use crate::agent::events::SourcesPayload;
use crate::agent::events::MAX_SOURCES;
use crate::agent::prompts;
use crate::config::AppConfig;
use crate::llm::TextGenerator;
use crate::models::TicketDocument;
use crate::retrieval::Retriever;

/// Materialized result of a non-streaming `ask`
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub answer: String,
    pub sources: Vec<SourceSummary>,
    pub metadata: AnswerMetadata,
}

/// The answer engine over injected retrieval and generation capabilities
pub struct AnswerEngine {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn TextGenerator>,
    top_k: usize,
}

impl AnswerEngine {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn TextGenerator>,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self::new(retriever, generator, config.top_k())
    }

    /// Validate + retrieve. Shared front half of both entry points.
    async fn retrieve(&self, question: &str) -> Result<Vec<TicketDocument>, EngineFault> {
        if question.trim().is_empty() {
            return Err(EngineFault::question_format());
        }

        let vector = self
            .retriever
            .embed(question)
            .await
            .map_err(|e| EngineFault::retrieval(e.to_string()))?;

        let documents = self
            .retriever
            .search(&vector, self.top_k)
            .await
            .map_err(|e| EngineFault::retrieval(e.to_string()))?;

        if documents.is_empty() {
            return Err(EngineFault::no_results());
        }

        info!("Retrieved {} candidate tickets", documents.len());
        Ok(documents)
    }

    fn sources_payload(documents: &[TicketDocument]) -> SourcesPayload {
        SourcesPayload {
            sources: documents
                .iter()
                .take(MAX_SOURCES)
                .map(SourceSummary::from_document)
                .collect(),
            count: documents.len(),
        }
    }

    fn metadata(&self, started: Instant, retrieved_docs: usize) -> AnswerMetadata {
        let elapsed = started.elapsed().as_secs_f64();
        AnswerMetadata {
            query_time: (elapsed * 100.0).round() / 100.0,
            retrieved_docs,
            model: self.generator.model().to_string(),
            embed_model: self.retriever.embed_model().to_string(),
        }
    }

    /// Answer a question in one call
    pub async fn ask(&self, question: &str) -> Result<AgentReply, EngineFault> {
        let started = Instant::now();
        let documents = self.retrieve(question).await?;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let prompt = prompts::qa_prompt(&texts, question);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|e| EngineFault::llm(e.to_string()))?;

        let sources = Self::sources_payload(&documents).sources;
        let metadata = self.metadata(started, documents.len());
        Ok(AgentReply {
            answer,
            sources,
            metadata,
        })
    }

    /// Answer a question as an event stream.
    ///
    /// The returned stream always ends with exactly one `Done` or `Error`
    /// event and emits nothing after it.
    pub fn ask_stream(
        self: Arc<Self>,
        question: String,
    ) -> Pin<Box<dyn Stream<Item = AnswerEvent> + Send>> {
        let stream = async_stream::stream! {
            let started = Instant::now();

            if question.trim().is_empty() {
                warn!("Rejected empty question");
                yield AnswerEvent::from(EngineFault::question_format());
                return;
            }

            yield AnswerEvent::thinking_retrieving();

            let documents = match self.retrieve(&question).await {
                Ok(documents) => documents,
                Err(fault) => {
                    if fault.code != codes::NO_RELEVANT_RESULTS {
                        error!("Retrieval failed: {fault}");
                    }
                    yield AnswerEvent::from(fault);
                    return;
                }
            };

            yield AnswerEvent::Sources(Self::sources_payload(&documents));
            yield AnswerEvent::thinking_generating();

            let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
            let prompt = prompts::qa_prompt(&texts, &question);

            let mut fragments = match self.generator.generate_stream(&prompt).await {
                Ok(response) => response.into_stream(),
                Err(e) => {
                    error!("LLM stream open failed: {e}");
                    yield AnswerEvent::from(EngineFault::llm(e.to_string()));
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield AnswerEvent::token(fragment);
                    }
                    Err(e) => {
                        error!("LLM stream failed mid-generation: {e}");
                        yield AnswerEvent::from(EngineFault::llm(e.to_string()));
                        return;
                    }
                }
            }

            yield AnswerEvent::Done(DonePayload {
                answer: Some(answer),
                metadata: self.metadata(started, documents.len()),
                message_id: None,
            });
        };

        Box::pin(stream)
    }
}
