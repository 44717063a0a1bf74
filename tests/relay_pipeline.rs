//! End-to-end test of the streaming pipeline: a real answer engine feeding a
//! real relay orchestrator over an in-process gateway, with in-memory storage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ticketrag::agent::events::codes;
use ticketrag::agent::events::AnswerEvent;
use ticketrag::agent::AnswerEngine;
use ticketrag::database::ConversationStore;
use ticketrag::database::MemoryStore;
use ticketrag::llm::StreamingResponse;
use ticketrag::llm::TextGenerator;
use ticketrag::models::TicketDocument;
use ticketrag::models::TicketMetadata;
use ticketrag::relay::client::EventStream;
use ticketrag::relay::client::StreamItem;
use ticketrag::relay::AgentGateway;
use ticketrag::relay::RelayOrchestrator;
use ticketrag::retrieval::Retriever;
use ticketrag::Result;

struct FixedRetriever {
    documents: Vec<TicketDocument>,
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; 8])
    }

    async fn search(&self, _vector: &[f32], _k: usize) -> Result<Vec<TicketDocument>> {
        Ok(self.documents.clone())
    }

    fn embed_model(&self) -> &str {
        "fixed-embed"
    }
}

struct FixedGenerator {
    fragments: Vec<&'static str>,
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.fragments.concat())
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<StreamingResponse> {
        let fragments = self.fragments.clone();
        let stream = async_stream::try_stream! {
            for fragment in fragments {
                yield fragment.to_string();
            }
        };
        Ok(StreamingResponse::new(Box::pin(stream)))
    }

    fn model(&self) -> &str {
        "fixed-llm"
    }
}

/// Gateway that drives a real engine in-process, bypassing HTTP
struct InProcessGateway {
    engine: Arc<AnswerEngine>,
}

#[async_trait]
impl AgentGateway for InProcessGateway {
    async fn open_stream(&self, question: &str) -> Result<EventStream> {
        let events = Arc::clone(&self.engine).ask_stream(question.to_string());
        Ok(Box::pin(events.map(StreamItem::Event)))
    }

    async fn completion(&self, question: &str) -> Result<String> {
        let reply = self
            .engine
            .ask(question)
            .await
            .map_err(|f| ticketrag::TicketRagError::Agent(f.to_string()))?;
        Ok(reply.answer)
    }
}

fn documents() -> Vec<TicketDocument> {
    [(0.1_f32, "TK-1"), (0.2, "TK-2"), (0.4, "TK-3")]
        .iter()
        .map(|(distance, id)| TicketDocument {
            text: format!("Resolution notes for {id}"),
            metadata: TicketMetadata {
                ticket_id: (*id).to_string(),
                issue_type: "shipping".to_string(),
                priority: "high".to_string(),
                status: "resolved".to_string(),
            },
            distance: Some(*distance),
        })
        .collect()
}

fn pipeline(fragments: Vec<&'static str>) -> (Arc<MemoryStore>, Arc<RelayOrchestrator>) {
    let engine = Arc::new(AnswerEngine::new(
        Arc::new(FixedRetriever {
            documents: documents(),
        }),
        Arc::new(FixedGenerator { fragments }),
        5,
    ));
    let store = Arc::new(MemoryStore::new());
    let relay = Arc::new(RelayOrchestrator::new(
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::new(InProcessGateway { engine }),
        Duration::from_secs(60),
        Duration::from_secs(30),
    ));
    (store, relay)
}

#[tokio::test]
async fn test_full_pipeline_streams_persists_and_titles() {
    let (store, relay) = pipeline(vec!["Check ", "the ", "tracking ", "page."]);
    let conversation = store.create_conversation(7, "New conversation").await.unwrap();

    let events: Vec<AnswerEvent> = relay
        .handle(conversation.id, 7, "Where is my package?".to_string())
        .await
        .unwrap()
        .collect()
        .await;

    // thinking, sources, thinking, token x4, done
    let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
    assert_eq!(
        names,
        vec!["thinking", "sources", "thinking", "token", "token", "token", "token", "done"]
    );

    match &events[1] {
        AnswerEvent::Sources(p) => {
            assert_eq!(p.count, 3);
            let scores: Vec<f32> = p.sources.iter().map(|s| s.score.unwrap()).collect();
            assert!((scores[0] - 0.9).abs() < 1e-6);
            assert!((scores[1] - 0.8).abs() < 1e-6);
            assert!((scores[2] - 0.6).abs() < 1e-6);
        }
        other => panic!("unexpected event: {}", other.event_name()),
    }

    let messages = store.list_messages(conversation.id, 10, 0).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "Where is my package?");
    assert_eq!(messages[1].role, "assistant");
    assert_eq!(messages[1].content, "Check the tracking page.");

    match events.last().unwrap() {
        AnswerEvent::Done(p) => {
            assert!(p.answer.is_none());
            assert_eq!(p.message_id.as_deref(), Some(&messages[1].id.to_string()[..]));
            assert_eq!(p.metadata.retrieved_docs, 3);
            assert_eq!(p.metadata.model, "fixed-llm");
            assert_eq!(p.metadata.embed_model, "fixed-embed");
        }
        other => panic!("unexpected event: {}", other.event_name()),
    }

    // First completed exchange renamed the conversation via the in-process
    // completion call (clipped to the 30-character title cap).
    let renamed = store.get_conversation(conversation.id, 7).await.unwrap().unwrap();
    assert_ne!(renamed.title, "New conversation");
    assert!(renamed.title.chars().count() <= 30);
}

#[tokio::test]
async fn test_pipeline_rejects_empty_question_with_persisted_error_turn() {
    let (store, relay) = pipeline(vec!["unused"]);
    let conversation = store.create_conversation(7, "New conversation").await.unwrap();

    let events: Vec<AnswerEvent> = relay
        .handle(conversation.id, 7, "   ".to_string())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        AnswerEvent::Error(p) => assert_eq!(p.code, codes::QUESTION_FORMAT_ERROR),
        other => panic!("unexpected event: {}", other.event_name()),
    }

    // User turn plus the error rendered as the assistant turn
    let messages = store.list_messages(conversation.id, 10, 0).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, "assistant");
}

#[tokio::test]
async fn test_pipeline_second_exchange_keeps_existing_title() {
    let (store, relay) = pipeline(vec!["First ", "answer."]);
    let conversation = store.create_conversation(7, "New conversation").await.unwrap();

    relay
        .clone()
        .handle(conversation.id, 7, "first question".to_string())
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    let after_first = store.get_conversation(conversation.id, 7).await.unwrap().unwrap();

    relay
        .handle(conversation.id, 7, "second question".to_string())
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    let after_second = store.get_conversation(conversation.id, 7).await.unwrap().unwrap();

    assert_eq!(after_first.title, after_second.title);
    assert_eq!(store.count_messages(conversation.id).await.unwrap(), 4);
}
