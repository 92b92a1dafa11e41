//! Knowledge retriever client
//!
//! Thin client for the vector-similarity search RPC. The retriever returns
//! ranked (text, score, metadata) triples; relevance filtering and banding
//! happen in the knowledge capability, not here.

pub mod encoding;

use async_trait::async_trait;
use concierge_common::{ConciergeError, Result, RetrievalConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// One retrieved document chunk with its relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    /// Originating-document metadata, opaque to the core
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Relevance score in [0, 1]
    pub score: f32,
}

/// Coarse relevance band, used only to annotate results in prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            Relevance::High
        } else if score >= 0.7 {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relevance::High => write!(f, "high"),
            Relevance::Medium => write!(f, "medium"),
            Relevance::Low => write!(f, "low"),
        }
    }
}

/// Seam to the external vector-similarity search service
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Return up to `k` chunks ordered by descending relevance
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    match_count: usize,
}

#[derive(Deserialize)]
struct SearchRow {
    content: String,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(alias = "similarity")]
    score: f32,
}

/// HTTP implementation of [`KnowledgeRetriever`]
///
/// Posts `{query, match_count}` to the configured RPC endpoint and expects a
/// JSON array of `{content, metadata, similarity}` rows.
pub struct HttpRetriever {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpRetriever {
    pub fn new(config: &RetrievalConfig) -> Self {
        HttpRetriever {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        debug!("Retrieval query '{}' (k={})", query, k);

        let mut request = self.client.post(&self.endpoint).json(&SearchRequest {
            query,
            match_count: k,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConciergeError::Retrieval(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ConciergeError::Retrieval(format!(
                "retriever returned status {}",
                response.status()
            )));
        }

        let rows: Vec<SearchRow> = response
            .json()
            .await
            .map_err(|e| ConciergeError::Retrieval(format!("bad response body: {}", e)))?;

        let mut chunks: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| RetrievedChunk {
                content: row.content,
                metadata: row.metadata,
                score: row.score,
            })
            .collect();

        // The service contract says descending order; enforce it locally so
        // downstream banding can rely on it
        chunks.sort_by(|a, b| b.score.total_cmp(&a.score));

        info!("Retrieved {} chunks for query", chunks.len());
        Ok(chunks)
    }
}
