//! Prompt templates for answer generation and title synthesis

/// Build the grounded QA prompt from retrieved ticket texts and the question.
///
/// Ticket texts are joined by a blank line, in retrieval order.
pub fn qa_prompt(documents: &[String], question: &str) -> String {
    let context = documents.join("\n\n");
    format!(
        "You are a customer support assistant. Answer the user's question using \
         only the historical ticket records below. If the records do not cover \
         the question, say so instead of guessing.\n\n\
         Historical tickets:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Build the one-shot title prompt for a conversation's first question
pub fn title_prompt(question: &str) -> String {
    format!(
        "Summarize the following customer question as a conversation title of \
         at most 20 characters. Reply with the title only, no quotes, no \
         punctuation at the end.\n\n\
         Question: {question}\n\n\
         Title:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qa_prompt_joins_documents_with_blank_line() {
        let docs = vec!["first ticket".to_string(), "second ticket".to_string()];
        let prompt = qa_prompt(&docs, "Where is my order?");
        assert!(prompt.contains("first ticket\n\nsecond ticket"));
        assert!(prompt.contains("Question: Where is my order?"));
    }

    #[test]
    fn test_title_prompt_embeds_question() {
        let prompt = title_prompt("How do I get a refund?");
        assert!(prompt.contains("Question: How do I get a refund?"));
        assert!(prompt.contains("20 characters"));
    }
}
