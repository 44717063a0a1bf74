//! Answer engine: the producer side of the streaming event protocol
//!
//! Turns one support question into an ordered event sequence
//! (`thinking → sources → token* → done|error`) by orchestrating vector
//! retrieval and LLM generation. Exactly one terminal event ends every
//! sequence; no event follows a terminal.

pub mod engine;
pub mod events;
pub mod prompts;

pub use engine::AgentReply;
pub use engine::AnswerEngine;
pub use events::AnswerEvent;
pub use events::AnswerMetadata;
pub use events::EngineFault;
pub use events::SourceSummary;
