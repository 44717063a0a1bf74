//! Relay/persistence state machine
//!
//! `handle` drives one question exchange: ownership check, user-message
//! persist, upstream stream consumption with a hard deadline, verbatim
//! forwarding with token accumulation, assistant-message persist, and the
//! one-time title gate. Exactly one assistant message is persisted per
//! invocation, always before the terminal event is forwarded.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::agent::events::codes;
use crate::agent::events::AnswerEvent;
use crate::agent::events::DonePayload;
use crate::database::ConversationStore;
use crate::errors::Result;
use crate::errors::TicketRagError;
use crate::models::Message;
use crate::models::MessageRole;
use crate::relay::client::AgentGateway;
use crate::relay::client::StreamItem;
use crate::relay::title::fallback_title;
use crate::relay::title::TitleSynthesizer;

const TIMEOUT_MESSAGE: &str = "Answer generation timed out. Please try again later.";
const FAILURE_MESSAGE: &str =
    "The answer service is temporarily unavailable. Please try again later.";

/// Consecutive unparseable frames tolerated before the stream is declared faulty
const MAX_CONSECUTIVE_MALFORMED: u32 = 2;

pub type RelayStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

/// Per-request relay state.
///
/// Accumulates forwarded token fragments; if the session is dropped before an
/// assistant message was persisted (client disconnect), a best-effort persist
/// of the partial content is spawned.
struct StreamSession {
    store: Arc<dyn ConversationStore>,
    conversation_id: i64,
    partial: String,
    finalized: bool,
}

impl StreamSession {
    fn new(store: Arc<dyn ConversationStore>, conversation_id: i64) -> Self {
        Self {
            store,
            conversation_id,
            partial: String::new(),
            finalized: false,
        }
    }

    fn push_token(&mut self, fragment: &str) {
        self.partial.push_str(fragment);
    }

    /// Persist the assistant turn and close the session.
    ///
    /// Marks the session finalized before writing so the drop path can never
    /// produce a second assistant message.
    async fn persist_assistant(&mut self, content: &str) -> Result<Message> {
        self.finalized = true;
        self.store
            .create_message(self.conversation_id, MessageRole::Assistant, content)
            .await
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.finalized || self.partial.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let conversation_id = self.conversation_id;
        let content = std::mem::take(&mut self.partial);
        info!(
            "Session for conversation {} ended early, persisting partial answer",
            conversation_id
        );
        tokio::spawn(async move {
            if let Err(e) = store
                .create_message(conversation_id, MessageRole::Assistant, &content)
                .await
            {
                warn!(
                    "Failed to persist partial answer for conversation {}: {}",
                    conversation_id, e
                );
            }
        });
    }
}

/// The relay tier over storage and the agent gateway
pub struct RelayOrchestrator {
    store: Arc<dyn ConversationStore>,
    gateway: Arc<dyn AgentGateway>,
    titles: TitleSynthesizer,
    exchange_timeout: Duration,
}

impl RelayOrchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        gateway: Arc<dyn AgentGateway>,
        exchange_timeout: Duration,
        title_timeout: Duration,
    ) -> Self {
        let titles = TitleSynthesizer::new(Arc::clone(&gateway), title_timeout);
        Self {
            store,
            gateway,
            titles,
            exchange_timeout,
        }
    }

    /// Drive one question exchange for an owned conversation.
    ///
    /// The ownership check and the user-message persist happen before this
    /// returns; the returned stream performs the upstream exchange.
    pub async fn handle(
        self: Arc<Self>,
        conversation_id: i64,
        user_id: i64,
        content: String,
    ) -> Result<RelayStream> {
        self.store
            .get_conversation(conversation_id, user_id)
            .await?
            .ok_or(TicketRagError::ConversationNotFound(conversation_id))?;

        self.store
            .create_message(conversation_id, MessageRole::User, &content)
            .await?;

        let orchestrator = Arc::clone(&self);
        let stream = async_stream::stream! {
            let mut session = StreamSession::new(Arc::clone(&orchestrator.store), conversation_id);
            let deadline = tokio::time::Instant::now() + orchestrator.exchange_timeout;

            let mut upstream = match orchestrator.gateway.open_stream(&content).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    error!("Failed to open agent stream: {e}");
                    yield orchestrator
                        .fail(&mut session, codes::INTERNAL_ERROR, Some(e.to_string()))
                        .await;
                    return;
                }
            };

            let mut consecutive_malformed = 0u32;

            loop {
                let item = match tokio::time::timeout_at(deadline, upstream.next()).await {
                    Ok(item) => item,
                    Err(_) => {
                        warn!(
                            "Exchange deadline exceeded for conversation {}",
                            conversation_id
                        );
                        yield orchestrator
                            .fail(&mut session, codes::GATEWAY_TIMEOUT, None)
                            .await;
                        return;
                    }
                };

                let item = match item {
                    Some(item) => item,
                    None => {
                        // Upstream closed without a terminal event
                        yield orchestrator
                            .fail(
                                &mut session,
                                codes::INTERNAL_ERROR,
                                Some("upstream closed without terminal event".to_string()),
                            )
                            .await;
                        return;
                    }
                };

                match item {
                    StreamItem::Malformed { event, detail } => {
                        consecutive_malformed += 1;
                        let terminal_frame = event == "done" || event == "error";
                        if terminal_frame || consecutive_malformed >= MAX_CONSECUTIVE_MALFORMED {
                            error!("Agent stream corrupted ({event}): {detail}");
                            yield orchestrator
                                .fail(&mut session, codes::INTERNAL_ERROR, Some(detail))
                                .await;
                            return;
                        }
                        warn!("Skipping malformed agent frame ({event}): {detail}");
                    }
                    StreamItem::Transport(detail) => {
                        error!("Agent stream transport fault: {detail}");
                        yield orchestrator
                            .fail(&mut session, codes::INTERNAL_ERROR, Some(detail))
                            .await;
                        return;
                    }
                    StreamItem::Event(event) => {
                        consecutive_malformed = 0;
                        match event {
                            AnswerEvent::Token(payload) => {
                                session.push_token(&payload.token);
                                yield AnswerEvent::Token(payload);
                            }
                            AnswerEvent::Done(payload) => {
                                match orchestrator
                                    .finish(&mut session, conversation_id, user_id, &content, payload)
                                    .await
                                {
                                    Ok(done) => yield done,
                                    Err(event) => yield event,
                                }
                                return;
                            }
                            AnswerEvent::Error(payload) => {
                                if let Err(e) = session.persist_assistant(&payload.msg).await {
                                    error!("Failed to persist error turn: {e}");
                                    yield AnswerEvent::error(
                                        codes::INTERNAL_ERROR,
                                        FAILURE_MESSAGE,
                                        Some(e.to_string()),
                                    );
                                    return;
                                }
                                yield AnswerEvent::Error(payload);
                                return;
                            }
                            passthrough => yield passthrough,
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Terminal fault path: persist a visible assistant turn, then synthesize
    /// the error event. The persist is attempted once; its failure is logged
    /// and the error event is still emitted.
    async fn fail(
        &self,
        session: &mut StreamSession,
        code: u32,
        detail: Option<String>,
    ) -> AnswerEvent {
        let (msg, content) = match code {
            codes::GATEWAY_TIMEOUT => ("Answer generation timed out", TIMEOUT_MESSAGE),
            _ => ("Answer service failed", FAILURE_MESSAGE),
        };
        if let Err(e) = session.persist_assistant(content).await {
            error!("Failed to persist failure turn: {e}");
        }
        AnswerEvent::error(code, msg, detail)
    }

    /// Successful-completion path: persist the answer, run the one-time title
    /// gate, and build the augmented `Done`. On persistence failure the `Done`
    /// is suppressed and an error terminal returned instead.
    async fn finish(
        &self,
        session: &mut StreamSession,
        conversation_id: i64,
        user_id: i64,
        question: &str,
        payload: DonePayload,
    ) -> std::result::Result<AnswerEvent, AnswerEvent> {
        let answer = payload
            .answer
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| session.partial.clone());

        let message = match session.persist_assistant(&answer).await {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to persist assistant answer: {e}");
                return Err(AnswerEvent::error(
                    codes::INTERNAL_ERROR,
                    FAILURE_MESSAGE,
                    Some(e.to_string()),
                ));
            }
        };

        // First completed exchange (user + assistant) names the conversation.
        // Read-then-act without a lock: a concurrent duplicate rename is
        // harmless and tolerated.
        match self.store.count_messages(conversation_id).await {
            Ok(2) => {
                let title = self.titles.synthesize(question).await;
                if let Err(e) = self
                    .store
                    .update_conversation_title(conversation_id, user_id, &title)
                    .await
                {
                    warn!("Failed to store synthesized title: {e}");
                    let fallback = fallback_title(question);
                    if let Err(e) = self
                        .store
                        .update_conversation_title(conversation_id, user_id, &fallback)
                        .await
                    {
                        warn!("Failed to store fallback title: {e}");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to count messages for title gate: {e}"),
        }

        Ok(AnswerEvent::Done(DonePayload {
            answer: None,
            metadata: payload.metadata,
            message_id: Some(message.id.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::agent::events::AnswerMetadata;
    use crate::database::MemoryStore;
    use crate::relay::client::EventStream;

    fn metadata() -> AnswerMetadata {
        AnswerMetadata {
            query_time: 1.23,
            retrieved_docs: 3,
            model: "mock-llm".to_string(),
            embed_model: "mock-embed".to_string(),
        }
    }

    fn done_event(answer: &str) -> AnswerEvent {
        AnswerEvent::Done(DonePayload {
            answer: Some(answer.to_string()),
            metadata: metadata(),
            message_id: None,
        })
    }

    /// Gateway that replays a scripted item sequence
    struct ScriptedGateway {
        items: Mutex<Option<Vec<StreamItem>>>,
        title: String,
        hang_after: bool,
    }

    impl ScriptedGateway {
        fn new(items: Vec<StreamItem>) -> Self {
            Self {
                items: Mutex::new(Some(items)),
                title: "Synthesized title".to_string(),
                hang_after: false,
            }
        }
    }

    #[async_trait]
    impl AgentGateway for ScriptedGateway {
        async fn open_stream(&self, _question: &str) -> Result<EventStream> {
            let items = self
                .items
                .lock()
                .unwrap()
                .take()
                .expect("stream opened twice");
            let scripted = futures::stream::iter(items);
            if self.hang_after {
                Ok(Box::pin(scripted.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(scripted))
            }
        }

        async fn completion(&self, _question: &str) -> Result<String> {
            Ok(self.title.clone())
        }
    }

    fn orchestrator(
        store: Arc<MemoryStore>,
        gateway: ScriptedGateway,
    ) -> Arc<RelayOrchestrator> {
        Arc::new(RelayOrchestrator::new(
            store,
            Arc::new(gateway),
            Duration::from_millis(200),
            Duration::from_millis(200),
        ))
    }

    async fn seed_conversation(store: &MemoryStore) -> i64 {
        store
            .create_conversation(1, "New conversation")
            .await
            .unwrap()
            .id
    }

    fn happy_script() -> Vec<StreamItem> {
        vec![
            StreamItem::Event(AnswerEvent::thinking_retrieving()),
            StreamItem::Event(AnswerEvent::token("Hello ")),
            StreamItem::Event(AnswerEvent::token("world")),
            StreamItem::Event(done_event("Hello world")),
        ]
    }

    #[tokio::test]
    async fn test_happy_path_persists_and_augments_done() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(happy_script()));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "Where is my order?".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
        assert_eq!(names, vec!["thinking", "token", "token", "done"]);

        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "Hello world");

        match events.last().unwrap() {
            AnswerEvent::Done(p) => {
                assert!(p.answer.is_none());
                assert_eq!(p.message_id.as_deref(), Some(&messages[1].id.to_string()[..]));
                assert_eq!(p.metadata.retrieved_docs, 3);
            }
            other => panic!("unexpected event: {}", other.event_name()),
        }
    }

    #[tokio::test]
    async fn test_title_gate_fires_on_first_exchange_only() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(happy_script()));

        relay
            .handle(conversation_id, 1, "first question".to_string())
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        let conversation = store.get_conversation(conversation_id, 1).await.unwrap().unwrap();
        assert_eq!(conversation.title, "Synthesized title");

        // Second exchange must not rename
        store
            .update_conversation_title(conversation_id, 1, "User renamed")
            .await
            .unwrap();
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(happy_script()));
        relay
            .handle(conversation_id, 1, "second question".to_string())
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;

        let conversation = store.get_conversation(conversation_id, 1).await.unwrap().unwrap();
        assert_eq!(conversation.title, "User renamed");
    }

    #[tokio::test]
    async fn test_upstream_error_persists_error_message() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let script = vec![
            StreamItem::Event(AnswerEvent::thinking_retrieving()),
            StreamItem::Event(AnswerEvent::error(
                codes::NO_RELEVANT_RESULTS,
                "No related ticket records found",
                None,
            )),
        ];
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(script));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        match events.last().unwrap() {
            AnswerEvent::Error(p) => assert_eq!(p.code, codes::NO_RELEVANT_RESULTS),
            other => panic!("unexpected event: {}", other.event_name()),
        }
        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "No related ticket records found");
    }

    #[tokio::test]
    async fn test_timeout_synthesizes_504_and_persists_timeout_turn() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let mut gateway = ScriptedGateway::new(vec![StreamItem::Event(AnswerEvent::token("par"))]);
        gateway.hang_after = true;
        let relay = orchestrator(Arc::clone(&store), gateway);

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        match events.last().unwrap() {
            AnswerEvent::Error(p) => assert_eq!(p.code, codes::GATEWAY_TIMEOUT),
            other => panic!("unexpected event: {}", other.event_name()),
        }
        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_single_malformed_frame_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let script = vec![
            StreamItem::Event(AnswerEvent::token("a")),
            StreamItem::Malformed {
                event: "token".to_string(),
                detail: "bad json".to_string(),
            },
            StreamItem::Event(AnswerEvent::token("b")),
            StreamItem::Event(done_event("ab")),
        ];
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(script));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        let names: Vec<&str> = events.iter().map(|e| e.event_name()).collect();
        assert_eq!(names, vec!["token", "token", "done"]);
    }

    #[tokio::test]
    async fn test_two_consecutive_malformed_frames_fault_the_stream() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let script = vec![
            StreamItem::Event(AnswerEvent::token("a")),
            StreamItem::Malformed {
                event: "token".to_string(),
                detail: "bad json".to_string(),
            },
            StreamItem::Malformed {
                event: "sources".to_string(),
                detail: "bad json".to_string(),
            },
            StreamItem::Event(done_event("never")),
        ];
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(script));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        match events.last().unwrap() {
            AnswerEvent::Error(p) => assert_eq!(p.code, codes::INTERNAL_ERROR),
            other => panic!("unexpected event: {}", other.event_name()),
        }
        assert!(!events.iter().any(|e| matches!(e, AnswerEvent::Done(_))));
        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert_eq!(messages[1].content, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_terminal_frame_faults_immediately() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let script = vec![
            StreamItem::Event(AnswerEvent::token("a")),
            StreamItem::Malformed {
                event: "done".to_string(),
                detail: "truncated json".to_string(),
            },
        ];
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(script));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        match events.last().unwrap() {
            AnswerEvent::Error(p) => assert_eq!(p.code, codes::INTERNAL_ERROR),
            other => panic!("unexpected event: {}", other.event_name()),
        }
    }

    #[tokio::test]
    async fn test_transport_fault_synthesizes_500() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let script = vec![
            StreamItem::Event(AnswerEvent::token("a")),
            StreamItem::Transport("connection reset".to_string()),
        ];
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(script));

        let events: Vec<AnswerEvent> = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap()
            .collect()
            .await;

        match events.last().unwrap() {
            AnswerEvent::Error(p) => {
                assert_eq!(p.code, codes::INTERNAL_ERROR);
                assert!(p.error_detail.as_deref().unwrap().contains("connection reset"));
            }
            other => panic!("unexpected event: {}", other.event_name()),
        }
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_rejected_before_upstream() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let relay = orchestrator(Arc::clone(&store), ScriptedGateway::new(happy_script()));

        // Wrong owner
        let err = match relay.handle(conversation_id, 99, "q".to_string()).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, TicketRagError::ConversationNotFound(_)));
        // No user message leaked into the transcript
        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_persists_partial_answer() {
        let store = Arc::new(MemoryStore::new());
        let conversation_id = seed_conversation(&store).await;
        let tokens: Vec<StreamItem> = (0..8)
            .map(|i| StreamItem::Event(AnswerEvent::token(format!("t{i} "))))
            .collect();
        let mut gateway = ScriptedGateway::new(tokens);
        gateway.hang_after = true;
        let relay = orchestrator(Arc::clone(&store), gateway);

        let mut stream = relay
            .handle(conversation_id, 1, "q".to_string())
            .await
            .unwrap();
        for _ in 0..5 {
            let event = stream.next().await.unwrap();
            assert!(matches!(event, AnswerEvent::Token(_)));
        }
        drop(stream);

        // The drop persist runs on a spawned task
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = store.list_messages(conversation_id, 10, 0).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "t0 t1 t2 t3 t4 ");
    }
}
