//! Capability trait, descriptors and the closed kind table
//!
//! The declarative registry file maps capability names to one of the kinds
//! known at compile time; there is no runtime code loading. Each kind's
//! factory builds an instance from the descriptor's free-form config plus
//! the shared backends handed in at startup.

use async_trait::async_trait;
use concierge_common::{Result, RetrievalConfig};
use concierge_core::{CompletionBackend, KnowledgeRetriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::capabilities::knowledge::KnowledgeCapability;
use crate::capabilities::remote::RemoteToolCapability;

/// A unit of behavior the router can delegate a sub-query to
#[async_trait]
pub trait Capability: Send + Sync {
    /// Registry name of this capability
    fn name(&self) -> &str;

    /// Handle a natural-language sub-query and return natural-language text
    async fn process(&self, query: &str) -> Result<String>;
}

impl std::fmt::Debug for dyn Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability").field("name", &self.name()).finish()
    }
}

/// Closed set of capability implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Knowledge-base retrieval plus constrained generation
    Knowledge,
    /// Two-phase remote tool invocation (project management, analytics)
    Remote,
}

/// Declarative description of one registered capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Unique name within the registry
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher priority orders first; ties break by registration order
    #[serde(default)]
    pub priority: i32,
    /// Used verbatim in the routing decision
    pub description: String,
    /// Kind-specific configuration map
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

/// Shared services that capability factories draw on
pub struct CapabilityBackends {
    pub completion: Arc<dyn CompletionBackend>,
    pub retriever: Arc<dyn KnowledgeRetriever>,
    /// Deployment defaults for retrieval tunables; individual descriptors
    /// may override top_k and similarity_threshold in their config map
    pub retrieval: RetrievalConfig,
}

impl CapabilityKind {
    /// Factory table: build an instance for a descriptor
    pub fn build(
        &self,
        descriptor: &CapabilityDescriptor,
        backends: &CapabilityBackends,
    ) -> anyhow::Result<Arc<dyn Capability>> {
        match self {
            CapabilityKind::Knowledge => Ok(Arc::new(KnowledgeCapability::from_descriptor(
                descriptor,
                backends.retriever.clone(),
                backends.completion.clone(),
                &backends.retrieval,
            )?)),
            CapabilityKind::Remote => Ok(Arc::new(RemoteToolCapability::from_descriptor(
                descriptor,
                backends.completion.clone(),
            )?)),
        }
    }
}
