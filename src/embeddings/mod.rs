//! Embeddings generation module
//!
//! Maps question text to query vectors using an external provider:
//! - Ollama (local models)
//! - OpenAI-compatible endpoints
//!
//! # Examples
//!
//! ```rust,no_run
//! use ticketrag::embeddings::EmbeddingService;
//! use ticketrag::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let service = EmbeddingService::new(&config)?;
//!
//!     let embedding = service.generate("logistics status has not updated").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::TicketRagError;

/// High-level embedding service configured from [`AppConfig`]
pub struct EmbeddingService {
    client: EmbeddingClient,
    model: String,
}

impl EmbeddingService {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let provider = match config.embeddings.provider.as_str() {
            "ollama" => EmbeddingProvider::Ollama,
            "openai" => EmbeddingProvider::OpenAI,
            other => {
                return Err(TicketRagError::Config(format!(
                    "unknown embedding provider: {other}"
                )))
            }
        };

        let client = EmbeddingClient::new(
            provider,
            config.embeddings.model.clone(),
            config.embeddings.endpoint.clone(),
            config.embeddings.api_key.clone(),
        )?;

        Ok(Self {
            client,
            model: config.embeddings.model.clone(),
        })
    }

    /// Generate an embedding for a single text
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        self.client.generate(text).await
    }

    /// Model identifier, reported in answer metadata
    pub fn model(&self) -> &str {
        &self.model
    }
}
