//! Retrieval module: nearest historical tickets by vector similarity
//!
//! The engine only sees the [`Retriever`] capability; the live implementation
//! combines an [`EmbeddingService`] with the external ticket index.

pub mod index;

pub use index::TicketIndexClient;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::AppConfig;
use crate::embeddings::EmbeddingService;
use crate::errors::Result;
use crate::models::TicketDocument;

/// Capability that maps text to nearest stored documents by vector similarity
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Map text to a query vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Nearest documents for a query vector, ordered by ascending distance
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<TicketDocument>>;

    /// Embedding model identifier, reported in answer metadata
    fn embed_model(&self) -> &str;
}

/// Live retriever over the external embedding provider and ticket index
pub struct RetrievalClient {
    embeddings: Arc<EmbeddingService>,
    index: TicketIndexClient,
}

impl RetrievalClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let embeddings = Arc::new(EmbeddingService::new(config)?);
        let index = TicketIndexClient::new(
            config.vector_index.endpoint.clone(),
            config.vector_index.collection.clone(),
        )?;
        Ok(Self { embeddings, index })
    }

    pub fn from_services(embeddings: Arc<EmbeddingService>, index: TicketIndexClient) -> Self {
        Self { embeddings, index }
    }
}

#[async_trait]
impl Retriever for RetrievalClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embeddings.generate(text).await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<TicketDocument>> {
        let documents = self.index.near_vector(vector, k).await?;
        debug!("Retrieved {} documents", documents.len());
        Ok(documents)
    }

    fn embed_model(&self) -> &str {
        self.embeddings.model()
    }
}
