//! One-time conversation title synthesis

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::agent::prompts;
use crate::relay::client::AgentGateway;

/// Character count kept from the question when falling back
const FALLBACK_CHARS: usize = 20;
/// Hard cap on any synthesized title
const TITLE_MAX_CHARS: usize = 30;

/// Derives a short conversation title from the opening question.
///
/// Synthesis is best-effort and infallible: any upstream failure or timeout
/// falls back to a prefix of the question itself.
pub struct TitleSynthesizer {
    gateway: Arc<dyn AgentGateway>,
    budget: Duration,
}

impl TitleSynthesizer {
    pub fn new(gateway: Arc<dyn AgentGateway>, budget: Duration) -> Self {
        Self { gateway, budget }
    }

    pub async fn synthesize(&self, question: &str) -> String {
        let prompt = prompts::title_prompt(question);
        let call = self.gateway.completion(&prompt);
        match tokio::time::timeout(self.budget, call).await {
            Ok(Ok(raw)) => {
                let title = clean_title(&raw);
                if title.is_empty() {
                    warn!("Title synthesis returned empty text, using fallback");
                    fallback_title(question)
                } else {
                    info!("Synthesized conversation title: {}", title);
                    title
                }
            }
            Ok(Err(e)) => {
                warn!("Title synthesis failed, using fallback: {}", e);
                fallback_title(question)
            }
            Err(_) => {
                warn!("Title synthesis timed out, using fallback");
                fallback_title(question)
            }
        }
    }
}

/// Strip surrounding whitespace and quote pairs, then cap the length
fn clean_title(raw: &str) -> String {
    let mut title = raw.trim();
    loop {
        let stripped = title
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .or_else(|| title.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
            .or_else(|| {
                title
                    .strip_prefix('\u{201c}')
                    .and_then(|t| t.strip_suffix('\u{201d}'))
            });
        match stripped {
            Some(inner) => title = inner.trim(),
            None => break,
        }
    }
    truncate_chars(title, TITLE_MAX_CHARS)
}

/// First 20 characters of the question, with `...` appended when truncated.
///
/// Counts characters, not bytes, so multi-byte questions truncate cleanly.
pub fn fallback_title(question: &str) -> String {
    let question = question.trim();
    if question.chars().count() <= FALLBACK_CHARS {
        question.to_string()
    } else {
        let mut title: String = question.chars().take(FALLBACK_CHARS).collect();
        title.push_str("...");
        title
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
