//! Knowledge-base retrieval capability
//!
//! Pipeline: vector search, threshold filter, relevance banding, then a
//! constrained generation call that may answer only from the retrieved
//! context. An empty context short-circuits to a fixed response so the
//! model never answers from thin air.

use async_trait::async_trait;
use concierge_common::{Result, RetrievalConfig};
use concierge_core::retrieval::encoding::repair_mojibake;
use concierge_core::{CompletionBackend, KnowledgeRetriever, Relevance, RetrievedChunk};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::capability::{Capability, CapabilityDescriptor};

/// Fixed reply when no result survives the relevance threshold
pub const NO_RELEVANT_INFORMATION: &str =
    "No relevant information was found in the knowledge base for this request.";

/// Fixed reply when the retriever itself fails
pub const KNOWLEDGE_BASE_UNAVAILABLE: &str =
    "The knowledge base is temporarily unavailable. Please try again later.";

/// Per-descriptor overrides for the retrieval tunables
#[derive(Debug, Default, Deserialize)]
struct KnowledgeSettings {
    top_k: Option<usize>,
    similarity_threshold: Option<f32>,
}

pub struct KnowledgeCapability {
    name: String,
    retriever: Arc<dyn KnowledgeRetriever>,
    completion: Arc<dyn CompletionBackend>,
    top_k: usize,
    similarity_threshold: f32,
}

impl KnowledgeCapability {
    pub fn new(
        name: impl Into<String>,
        retriever: Arc<dyn KnowledgeRetriever>,
        completion: Arc<dyn CompletionBackend>,
        top_k: usize,
        similarity_threshold: f32,
    ) -> Self {
        KnowledgeCapability {
            name: name.into(),
            retriever,
            completion,
            top_k,
            similarity_threshold,
        }
    }

    /// Build from a registry descriptor, applying config overrides on top of
    /// the deployment retrieval defaults
    pub fn from_descriptor(
        descriptor: &CapabilityDescriptor,
        retriever: Arc<dyn KnowledgeRetriever>,
        completion: Arc<dyn CompletionBackend>,
        defaults: &RetrievalConfig,
    ) -> anyhow::Result<Self> {
        let settings: KnowledgeSettings = if descriptor.config.is_null() {
            KnowledgeSettings::default()
        } else {
            serde_json::from_value(descriptor.config.clone())?
        };

        Ok(Self::new(
            &descriptor.name,
            retriever,
            completion,
            settings.top_k.unwrap_or(defaults.top_k),
            settings
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
        ))
    }

    /// Keep results at or above the threshold, preserving their order
    fn filter_by_threshold(&self, chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
        chunks
            .into_iter()
            .filter(|chunk| chunk.score >= self.similarity_threshold)
            .collect()
    }

    /// Render surviving chunks as annotated context for the generation call.
    /// Bands only label the chunks; they never change what is included.
    fn build_context(chunks: &[RetrievedChunk]) -> String {
        let mut context = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let band = Relevance::from_score(chunk.score);
            let content = repair_mojibake(&chunk.content);
            context.push_str(&format!(
                "[Document {}] (relevance: {}, score: {:.2})\n{}\n\n",
                i + 1,
                band,
                chunk.score,
                content
            ));
        }
        context.trim_end().to_string()
    }

    fn build_prompt(context: &str, query: &str) -> String {
        format!(
            "Answer the user's question using ONLY the information in the \
context below. Do not invent or add outside information. If the context is \
incomplete, say so plainly.\n\n\
Context from the knowledge base:\n{}\n\n\
User question: {}\n\n\
Your answer must be clear, structured, and based solely on the context above.",
            context, query
        )
    }
}

#[async_trait]
impl Capability for KnowledgeCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, query: &str) -> Result<String> {
        info!("Knowledge capability processing query: '{}'", query);

        let chunks = match self.retriever.search(query, self.top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Retriever failed: {}", e);
                return Ok(KNOWLEDGE_BASE_UNAVAILABLE.to_string());
            }
        };

        let surviving = self.filter_by_threshold(chunks);
        debug!(
            "{} chunks survive threshold {}",
            surviving.len(),
            self.similarity_threshold
        );

        if surviving.is_empty() {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        }

        let context = Self::build_context(&surviving);
        let prompt = Self::build_prompt(&context, query);

        let answer = self.completion.complete(&prompt).await?;
        info!("Knowledge capability produced an answer");
        Ok(answer)
    }
}
