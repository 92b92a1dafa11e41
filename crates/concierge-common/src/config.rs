//! Configuration types for Concierge
//!
//! All tunables live here so deployments can adjust them without touching
//! code. Binaries load a `.env` file first (dotenvy) and then apply
//! environment overrides on top of the serde defaults.

use serde::{Deserialize, Serialize};

/// Knowledge retrieval tunables
///
/// The similarity threshold is deliberately deployment-tunable: corpora with
/// clean embeddings run well at 0.7+, while noisy or re-encoded corpora may
/// need values as low as 0.35.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the vector search RPC endpoint
    pub endpoint: String,
    /// API key sent with retrieval requests (optional)
    pub api_key: Option<String>,
    /// Number of results requested per query
    pub top_k: usize,
    /// Minimum relevance score in [0, 1] for a result to be usable
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/rpc/match_documents".to_string(),
            api_key: None,
            top_k: 5,
            similarity_threshold: 0.7,
        }
    }
}

/// Connection settings for a remote tool service (JSON-RPC 2.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteServiceConfig {
    /// Service endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RemoteServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000/rpc".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Session store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreConfig {
    /// In-memory store, lost on restart
    Memory,
    /// SurrealDB file-backed store, persistent across restarts
    Surreal { path: String },
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        SessionStoreConfig::Memory
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConciergeConfig {
    /// Provider/model string for routing decisions (genai format)
    pub provider: String,
    /// Provider/model string for knowledge answers; defaults to `provider`
    pub knowledge_provider: Option<String>,
    /// Upper bound on router loop iterations per message
    pub max_iterations: usize,
    /// Path to the capability registry YAML file
    pub registry_path: String,
    pub retrieval: RetrievalConfig,
    pub session_store: SessionStoreConfig,
    /// Host for the webhook server
    pub host: String,
    /// Port for the webhook server
    pub port: u16,
}

impl Default for ConciergeConfig {
    fn default() -> Self {
        Self {
            provider: "gpt-4o".to_string(),
            knowledge_provider: None,
            max_iterations: 5,
            registry_path: "config/capabilities.yaml".to_string(),
            retrieval: RetrievalConfig::default(),
            session_store: SessionStoreConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ConciergeConfig {
    /// Build a config from defaults plus environment overrides
    ///
    /// Recognized variables: `CONCIERGE_PROVIDER`, `CONCIERGE_MAX_ITERATIONS`,
    /// `CONCIERGE_REGISTRY`, `RETRIEVAL_ENDPOINT`, `RETRIEVAL_API_KEY`,
    /// `RETRIEVAL_TOP_K`, `SIMILARITY_THRESHOLD`, `SESSION_STORE`,
    /// `SESSION_STORE_PATH`, `CONCIERGE_HOST`, `CONCIERGE_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("CONCIERGE_PROVIDER") {
            config.provider = provider;
        }
        if let Ok(provider) = std::env::var("CONCIERGE_KNOWLEDGE_PROVIDER") {
            config.knowledge_provider = Some(provider);
        }
        if let Some(n) = env_parse::<usize>("CONCIERGE_MAX_ITERATIONS") {
            config.max_iterations = n;
        }
        if let Ok(path) = std::env::var("CONCIERGE_REGISTRY") {
            config.registry_path = path;
        }
        if let Ok(endpoint) = std::env::var("RETRIEVAL_ENDPOINT") {
            config.retrieval.endpoint = endpoint;
        }
        if let Ok(key) = std::env::var("RETRIEVAL_API_KEY") {
            config.retrieval.api_key = Some(key);
        }
        if let Some(k) = env_parse::<usize>("RETRIEVAL_TOP_K") {
            config.retrieval.top_k = k;
        }
        if let Some(threshold) = env_parse::<f32>("SIMILARITY_THRESHOLD") {
            config.retrieval.similarity_threshold = threshold;
        }
        match std::env::var("SESSION_STORE").as_deref() {
            Ok("memory") => config.session_store = SessionStoreConfig::Memory,
            Ok("surreal") => {
                let path = std::env::var("SESSION_STORE_PATH")
                    .unwrap_or_else(|_| "./data/sessions.db".to_string());
                config.session_store = SessionStoreConfig::Surreal { path };
            }
            Ok(other) => {
                tracing::warn!("Unknown SESSION_STORE '{}', using in-memory store", other);
            }
            Err(_) => {}
        }
        if let Ok(host) = std::env::var("CONCIERGE_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("CONCIERGE_PORT") {
            config.port = port;
        }

        config
    }

    /// Provider string used for knowledge-capability generation calls
    pub fn knowledge_provider(&self) -> &str {
        self.knowledge_provider.as_deref().unwrap_or(&self.provider)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}='{}'", name, raw);
                None
            }
        },
        Err(_) => None,
    }
}
