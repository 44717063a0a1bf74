use async_trait::async_trait;

use crate::models::Conversation;
use crate::models::Message;
use crate::models::MessageRole;
use crate::Result;

use super::ConversationStore;
use super::Database;

impl Database {
    pub(super) async fn insert_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r"
            INSERT INTO messages (conversation_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING id, conversation_id, role, content, created_at
            ",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(self.pool())
        .await?;

        // A new message bumps the conversation's recency ordering
        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(conversation_id)
            .execute(self.pool())
            .await?;

        Ok(message)
    }

    pub(super) async fn fetch_messages(
        &self,
        conversation_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }

    pub(super) async fn message_count(&self, conversation_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(self.pool())
        .await?;

        Ok(count)
    }
}

#[async_trait]
impl ConversationStore for Database {
    async fn create_conversation(&self, user_id: i64, title: &str) -> Result<Conversation> {
        self.insert_conversation(user_id, title).await
    }

    async fn get_conversation(&self, id: i64, user_id: i64) -> Result<Option<Conversation>> {
        self.fetch_conversation(id, user_id).await
    }

    async fn list_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        self.fetch_conversations(user_id, limit, offset).await
    }

    async fn update_conversation_title(
        &self,
        id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<Option<Conversation>> {
        self.set_conversation_title(id, user_id, title).await
    }

    async fn delete_conversation(&self, id: i64, user_id: i64) -> Result<bool> {
        self.remove_conversation(id, user_id).await
    }

    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        self.insert_message(conversation_id, role, content).await
    }

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>> {
        self.fetch_messages(conversation_id, limit, offset).await
    }

    async fn count_messages(&self, conversation_id: i64) -> Result<i64> {
        self.message_count(conversation_id).await
    }
}
