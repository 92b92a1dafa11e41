//! Concierge webhook server
//!
//! Exposes the message router over HTTP: a webhook endpoint for messaging
//! platform callbacks, an SSE variant for clients that want the reply
//! streamed, and a health endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use clap::Parser;
use concierge_agents::{CapabilityBackends, CapabilityRegistry, Router as MessageRouter};
use concierge_common::{ConciergeConfig, SessionStoreConfig};
use concierge_core::{
    GenaiBackend, HttpRetriever, MemorySessionStore, SessionStore, SurrealSessionStore,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod api;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful company assistant. Answer directly when \
you can; delegate to one of the available tools when the request needs company knowledge, \
project management or analytics data.";

/// Command-line arguments for the Concierge webhook server
#[derive(Parser, Debug)]
#[clap(name = "concierge-api", about = "Webhook server for the Concierge assistant")]
struct Args {
    /// Path to a system prompt file
    #[clap(long)]
    prompt: Option<PathBuf>,

    /// Host to bind to (overrides CONCIERGE_HOST)
    #[clap(long)]
    host: Option<String>,

    /// Port to listen on (overrides CONCIERGE_PORT)
    #[clap(short, long)]
    port: Option<u16>,

    /// Path to the capability registry file (overrides CONCIERGE_REGISTRY)
    #[clap(long)]
    registry: Option<PathBuf>,

    /// Provider/model to use for routing decisions (overrides CONCIERGE_PROVIDER)
    #[clap(long)]
    provider: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ConciergeConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(registry) = args.registry {
        config.registry_path = registry.to_string_lossy().into_owned();
    }
    if let Some(provider) = args.provider {
        config.provider = provider;
    }

    info!("Starting Concierge webhook server...");
    info!("Provider: {}", config.provider);
    info!("Registry: {}", config.registry_path);

    let system_prompt = match &args.prompt {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    };

    let decision_backend = Arc::new(GenaiBackend::new(&config.provider, Some(&system_prompt)));
    // Capability-internal generation may run on a cheaper model
    let generation_backend = Arc::new(GenaiBackend::new(config.knowledge_provider(), None));
    let retriever = Arc::new(HttpRetriever::new(&config.retrieval));

    let store: Arc<dyn SessionStore> = match &config.session_store {
        SessionStoreConfig::Memory => Arc::new(MemorySessionStore::new()),
        SessionStoreConfig::Surreal { path } => {
            info!("Using SurrealDB session store at {}", path);
            Arc::new(SurrealSessionStore::open(path).await?)
        }
    };

    let backends = Arc::new(CapabilityBackends {
        completion: generation_backend,
        retriever,
        retrieval: config.retrieval.clone(),
    });

    let mut registry = CapabilityRegistry::new(backends);
    match registry.load_yaml_file(&config.registry_path) {
        Ok(loaded) => info!("Registry holds {} capabilities", loaded),
        Err(e) => warn!("Starting without capabilities: {}", e),
    }
    let registry = Arc::new(registry);

    let message_router = Arc::new(MessageRouter::new(
        decision_backend,
        registry.clone(),
        store,
        config.max_iterations,
    ));

    let state = Arc::new(api::webhook::WebhookState {
        router: message_router,
        registry,
    });

    let app = Router::new().merge(api::webhook::webhook_routes(state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
