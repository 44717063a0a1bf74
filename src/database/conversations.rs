use crate::models::Conversation;
use crate::Result;

use super::Database;

impl Database {
    pub(super) async fn insert_conversation(
        &self,
        user_id: i64,
        title: &str,
    ) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r"
            INSERT INTO conversations (user_id, title)
            VALUES ($1, $2)
            RETURNING id, user_id, title, created_at, updated_at
            ",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(self.pool())
        .await?;

        Ok(conversation)
    }

    pub(super) async fn fetch_conversation(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(conversation)
    }

    pub(super) async fn fetch_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r"
            SELECT id, user_id, title, created_at, updated_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(conversations)
    }

    pub(super) async fn set_conversation_title(
        &self,
        id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r"
            UPDATE conversations
            SET title = $3, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .fetch_optional(self.pool())
        .await?;

        Ok(conversation)
    }

    pub(super) async fn remove_conversation(&self, id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::ConversationStore;
    use crate::models::MessageRole;

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_conversation_ownership_scoping() {
        let config = AppConfig::load().unwrap();
        let db = Database::from_config(&config).await.unwrap();
        db.init_schema().await.unwrap();

        let conversation = db.create_conversation(1, "first").await.unwrap();

        // Owner sees it, another user does not
        assert!(db
            .get_conversation(conversation.id, 1)
            .await
            .unwrap()
            .is_some());
        assert!(db
            .get_conversation(conversation.id, 2)
            .await
            .unwrap()
            .is_none());

        db.create_message(conversation.id, MessageRole::User, "hello")
            .await
            .unwrap();
        assert_eq!(db.count_messages(conversation.id).await.unwrap(), 1);

        assert!(db.delete_conversation(conversation.id, 1).await.unwrap());
    }
}
