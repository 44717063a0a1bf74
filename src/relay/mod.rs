//! Relay tier: consumes the agent's event stream, persists the conversation,
//! and re-emits the events to the client
//!
//! The relay is the durability boundary. Whatever the upstream does, every
//! invocation leaves exactly one assistant message in storage, persisted
//! before the terminal event reaches the client.

pub mod client;
pub mod orchestrator;
pub mod sse;
pub mod title;

pub use client::AgentClient;
pub use client::AgentGateway;
pub use orchestrator::RelayOrchestrator;
pub use sse::SseFrameDecoder;
pub use title::TitleSynthesizer;
