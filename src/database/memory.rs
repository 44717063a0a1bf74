//! In-memory [`ConversationStore`] used by tests and demos.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::models::Conversation;
use crate::models::Message;
use crate::models::MessageRole;
use crate::Result;

use super::ConversationStore;

/// Conversation store backed by concurrent maps instead of Postgres
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<i64, Conversation>,
    messages: DashMap<i64, Vec<Message>>,
    next_conversation_id: AtomicI64,
    next_message_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
            messages: DashMap::new(),
            next_conversation_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, user_id: i64, title: &str) -> Result<Conversation> {
        let id = self.next_conversation_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let conversation = Conversation {
            id,
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.conversations.insert(id, conversation.clone());
        self.messages.insert(id, Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: i64, user_id: i64) -> Result<Option<Conversation>> {
        Ok(self
            .conversations
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone()))
    }

    async fn list_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        let mut all: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone())
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update_conversation_title(
        &self,
        id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<Option<Conversation>> {
        match self.conversations.get_mut(&id) {
            Some(mut entry) if entry.user_id == user_id => {
                entry.title = title.to_string();
                entry.updated_at = Utc::now();
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_conversation(&self, id: i64, user_id: i64) -> Result<bool> {
        let owned = self
            .conversations
            .get(&id)
            .is_some_and(|c| c.user_id == user_id);
        if owned {
            self.conversations.remove(&id);
            self.messages.remove(&id);
        }
        Ok(owned)
    }

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            id,
            conversation_id,
            role: role.as_str().to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        if let Some(mut conversation) = self.conversations.get_mut(&conversation_id) {
            conversation.updated_at = message.created_at;
        }
        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .get(&conversation_id)
            .map(|m| {
                m.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_messages(&self, conversation_id: i64) -> Result<i64> {
        Ok(self
            .messages
            .get(&conversation_id)
            .map_or(0, |m| m.len() as i64))
    }
}
