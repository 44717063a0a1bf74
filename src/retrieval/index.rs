//! HTTP client for the external ticket vector index

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::errors::TicketRagError;
use crate::models::TicketDocument;
use crate::models::TicketMetadata;

/// Client for near-vector search against the ticket index service
pub struct TicketIndexClient {
    endpoint: String,
    collection: String,
    client: Client,
}

impl TicketIndexClient {
    pub fn new(endpoint: String, collection: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint,
            collection,
            client,
        })
    }

    /// Nearest stored tickets for a query vector.
    ///
    /// Results are returned in the index's own order (ascending distance) and
    /// are not re-sorted here.
    pub async fn near_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<TicketDocument>> {
        #[derive(Serialize)]
        struct SearchRequest<'a> {
            collection: &'a str,
            vector: &'a [f32],
            limit: usize,
        }

        #[derive(Deserialize)]
        struct SearchResponse {
            results: Vec<SearchHit>,
        }

        #[derive(Deserialize)]
        struct SearchHit {
            content: String,
            #[serde(default)]
            ticket_id: String,
            #[serde(default)]
            issue_type: String,
            #[serde(default)]
            priority: String,
            #[serde(default)]
            status: String,
            #[serde(default)]
            distance: Option<f32>,
        }

        let url = format!("{}/v1/search", self.endpoint);
        debug!("Calling ticket index: {} (limit: {})", url, limit);

        let request = SearchRequest {
            collection: &self.collection,
            vector,
            limit,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TicketRagError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TicketRagError::VectorSearch(format!(
                "ticket index error ({status}): {error_text}"
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| TicketRagError::VectorSearch(format!("Failed to parse response: {e}")))?;

        Ok(result
            .results
            .into_iter()
            .map(|hit| TicketDocument {
                text: hit.content,
                metadata: TicketMetadata {
                    ticket_id: hit.ticket_id,
                    issue_type: hit.issue_type,
                    priority: hit.priority,
                    status: hit.status,
                },
                distance: hit.distance,
            })
            .collect())
    }
}
