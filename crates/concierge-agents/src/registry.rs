//! Declarative capability registry
//!
//! Descriptors are loaded from a YAML file at startup. Instances are built
//! lazily on first delegation and cached; a failed construction is not
//! cached, so a capability whose backend was briefly down can recover on
//! the next request.

use concierge_common::{ConciergeError, Result};
use concierge_core::ToolSpec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::capability::{Capability, CapabilityBackends, CapabilityDescriptor};

/// Top-level shape of the registry YAML file
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    capabilities: Vec<serde_yaml::Value>,
}

pub struct CapabilityRegistry {
    /// Descriptors in registration order
    descriptors: Vec<CapabilityDescriptor>,
    by_name: HashMap<String, usize>,
    instances: Mutex<HashMap<String, Arc<dyn Capability>>>,
    backends: Arc<CapabilityBackends>,
}

impl CapabilityRegistry {
    pub fn new(backends: Arc<CapabilityBackends>) -> Self {
        CapabilityRegistry {
            descriptors: Vec::new(),
            by_name: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
            backends,
        }
    }

    /// Register one descriptor. Names must be unique across the registry.
    pub fn register(&mut self, descriptor: CapabilityDescriptor) -> Result<()> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(ConciergeError::DuplicateCapability(descriptor.name));
        }
        info!(
            "Registered capability '{}' (kind {:?}, priority {}, enabled {})",
            descriptor.name, descriptor.kind, descriptor.priority, descriptor.enabled
        );
        self.by_name
            .insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Load descriptors from registry YAML text. Malformed entries and
    /// duplicate names are logged and skipped rather than failing the whole
    /// file. Returns the number of descriptors registered.
    pub fn load_yaml_str(&mut self, yaml: &str) -> Result<usize> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| ConciergeError::Config(format!("bad registry file: {}", e)))?;

        let mut loaded = 0;
        for (i, entry) in file.capabilities.into_iter().enumerate() {
            let descriptor: CapabilityDescriptor = match serde_yaml::from_value(entry) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("Skipping malformed capability entry {}: {}", i, e);
                    continue;
                }
            };
            match self.register(descriptor) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping capability entry {}: {}", i, e),
            }
        }
        Ok(loaded)
    }

    pub fn load_yaml_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            ConciergeError::Config(format!("cannot read registry {}: {}", path.display(), e))
        })?;
        let loaded = self.load_yaml_str(&yaml)?;
        info!("Loaded {} capabilities from {}", loaded, path.display());
        Ok(loaded)
    }

    pub fn descriptor(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    /// Enabled descriptors ordered by priority descending; ties keep
    /// registration order
    pub fn enabled_descriptors(&self) -> Vec<&CapabilityDescriptor> {
        let mut enabled: Vec<&CapabilityDescriptor> =
            self.descriptors.iter().filter(|d| d.enabled).collect();
        enabled.sort_by_key(|d| std::cmp::Reverse(d.priority));
        enabled
    }

    /// Tool specs exposed to the routing decision, in exposure order
    pub fn router_tools(&self) -> Vec<ToolSpec> {
        self.enabled_descriptors()
            .into_iter()
            .map(|d| ToolSpec {
                name: d.name.clone(),
                description: d.description.clone(),
            })
            .collect()
    }

    /// Resolve a capability instance, building and caching it on first use
    pub async fn instantiate(&self, name: &str) -> Result<Arc<dyn Capability>> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| ConciergeError::UnknownCapability(name.to_string()))?;
        if !descriptor.enabled {
            return Err(ConciergeError::DisabledCapability(name.to_string()));
        }

        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get(name) {
            return Ok(instance.clone());
        }

        let instance = descriptor
            .kind
            .build(descriptor, &self.backends)
            .map_err(|source| ConciergeError::Construction {
                name: name.to_string(),
                source,
            })?;
        instances.insert(name.to_string(), instance.clone());
        info!("Constructed capability '{}'", name);
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_common::{RetrievalConfig, Turn};
    use concierge_core::{
        BackendReply, CompletionBackend, KnowledgeRetriever, RetrievedChunk,
    };

    struct NullCompletion;

    #[async_trait]
    impl CompletionBackend for NullCompletion {
        async fn decide(&self, _turns: &[Turn], _tools: &[ToolSpec]) -> Result<BackendReply> {
            Ok(BackendReply::Answer("ok".to_string()))
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("ok".to_string())
        }
    }

    struct NullRetriever;

    #[async_trait]
    impl KnowledgeRetriever for NullRetriever {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedChunk>> {
            Ok(Vec::new())
        }
    }

    fn backends() -> Arc<CapabilityBackends> {
        Arc::new(CapabilityBackends {
            completion: Arc::new(NullCompletion),
            retriever: Arc::new(NullRetriever),
            retrieval: RetrievalConfig::default(),
        })
    }

    const REGISTRY_YAML: &str = r#"
capabilities:
  - name: knowledge_search
    kind: knowledge
    priority: 10
    description: Searches the company knowledge base
  - name: project_api
    kind: remote
    priority: 5
    description: Project management operations
    config:
      endpoint: http://localhost:9000/rpc
  - name: analytics
    kind: remote
    enabled: false
    description: Data analytics queries
    config:
      endpoint: http://localhost:9001/rpc
"#;

    #[test]
    fn test_load_yaml_and_exposure_order() {
        let mut registry = CapabilityRegistry::new(backends());
        let loaded = registry.load_yaml_str(REGISTRY_YAML).unwrap();
        assert_eq!(loaded, 3);

        let tools = registry.router_tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        // analytics is disabled and must not be exposed
        assert_eq!(names, vec!["knowledge_search", "project_api"]);
    }

    #[test]
    fn test_priority_ties_keep_registration_order() {
        let mut registry = CapabilityRegistry::new(backends());
        registry
            .load_yaml_str(
                "capabilities:\n\
                 - {name: a, kind: knowledge, priority: 1, description: a}\n\
                 - {name: b, kind: knowledge, priority: 1, description: b}\n\
                 - {name: c, kind: knowledge, priority: 2, description: c}\n",
            )
            .unwrap();

        let names: Vec<String> = registry
            .enabled_descriptors()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_malformed_and_duplicate_entries_are_skipped() {
        let mut registry = CapabilityRegistry::new(backends());
        let loaded = registry
            .load_yaml_str(
                "capabilities:\n\
                 - {name: kb, kind: knowledge, description: kb}\n\
                 - {kind: knowledge, description: missing name}\n\
                 - {name: kb, kind: knowledge, description: duplicate}\n",
            )
            .unwrap();
        assert_eq!(loaded, 1);
        assert!(registry.descriptor("kb").is_some());
    }

    #[test]
    fn test_duplicate_register_is_an_error() {
        let mut registry = CapabilityRegistry::new(backends());
        let descriptor: CapabilityDescriptor = serde_yaml::from_str(
            "name: kb\nkind: knowledge\ndescription: kb\n",
        )
        .unwrap();
        registry.register(descriptor.clone()).unwrap();
        let err = registry.register(descriptor).unwrap_err();
        assert!(matches!(err, ConciergeError::DuplicateCapability(_)));
    }

    #[tokio::test]
    async fn test_instantiate_unknown_and_disabled() {
        let mut registry = CapabilityRegistry::new(backends());
        registry.load_yaml_str(REGISTRY_YAML).unwrap();

        let err = registry.instantiate("no_such").await.unwrap_err();
        assert!(matches!(err, ConciergeError::UnknownCapability(_)));

        let err = registry.instantiate("analytics").await.unwrap_err();
        assert!(matches!(err, ConciergeError::DisabledCapability(_)));
    }

    #[tokio::test]
    async fn test_instantiate_caches_instances() {
        let mut registry = CapabilityRegistry::new(backends());
        registry.load_yaml_str(REGISTRY_YAML).unwrap();

        let first = registry.instantiate("knowledge_search").await.unwrap();
        let second = registry.instantiate("knowledge_search").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
