use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::Conversation;
use crate::models::Message;
use crate::models::MessageRole;
use crate::Result;

mod conversations;
mod memory;
mod messages;
mod schema;

pub use memory::MemoryStore;

/// Durable record of conversations and messages.
///
/// Every read and write is scoped by conversation id plus owning user id, so
/// requests for different users cannot observe each other's data.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, user_id: i64, title: &str) -> Result<Conversation>;

    /// Fetch a conversation only if it is owned by `user_id`
    async fn get_conversation(&self, id: i64, user_id: i64) -> Result<Option<Conversation>>;

    async fn list_conversations(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>>;

    async fn update_conversation_title(
        &self,
        id: i64,
        user_id: i64,
        title: &str,
    ) -> Result<Option<Conversation>>;

    async fn delete_conversation(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Append a message; messages are immutable once created
    async fn create_message(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message>;

    async fn list_messages(
        &self,
        conversation_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>>;

    async fn count_messages(&self, conversation_id: i64) -> Result<i64>;
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database instance from configuration
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::info!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}
