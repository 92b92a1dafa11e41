use anyhow::Result;
use clap::Parser;
use colored::*;
use concierge_agents::{CapabilityBackends, CapabilityRegistry, Router};
use concierge_common::{ConciergeConfig, SessionStoreConfig};
use concierge_core::{
    GenaiBackend, HttpRetriever, MemorySessionStore, SessionStore, SurrealSessionStore,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

const SYSTEM_PROMPT: &str = "You are a helpful company assistant. Answer directly when you can; \
delegate to one of the available tools when the request needs company knowledge, project \
management or analytics data.";

/// Command-line arguments for the Concierge terminal client
#[derive(Parser)]
#[command(name = "concierge", about = "Interactive terminal client for the Concierge assistant")]
pub struct Args {
    /// Enable debug mode
    #[clap(short, long)]
    debug: bool,

    /// LLM provider to use (overrides CONCIERGE_PROVIDER)
    #[clap(long)]
    provider: Option<String>,

    /// Path to the capability registry file (overrides CONCIERGE_REGISTRY)
    #[clap(long)]
    registry: Option<PathBuf>,

    /// Continue an existing session instead of starting a fresh one
    #[clap(long)]
    session: Option<String>,
}

async fn build_router(config: &ConciergeConfig) -> Result<Arc<Router>> {
    let decision_backend = Arc::new(GenaiBackend::new(&config.provider, Some(SYSTEM_PROMPT)));
    let generation_backend = Arc::new(GenaiBackend::new(config.knowledge_provider(), None));
    let retriever = Arc::new(HttpRetriever::new(&config.retrieval));

    let backends = Arc::new(CapabilityBackends {
        completion: generation_backend,
        retriever,
        retrieval: config.retrieval.clone(),
    });

    let mut registry = CapabilityRegistry::new(backends);
    let loaded = registry.load_yaml_file(&config.registry_path)?;
    info!("Loaded {} capabilities", loaded);

    // The store is built per process, so a memory store means one CLI run
    // keeps its own history and drops it on exit
    let store: Arc<dyn SessionStore> = match &config.session_store {
        SessionStoreConfig::Memory => Arc::new(MemorySessionStore::new()),
        SessionStoreConfig::Surreal { path } => Arc::new(SurrealSessionStore::open(path).await?),
    };

    Ok(Arc::new(Router::new(
        decision_backend,
        Arc::new(registry),
        store,
        config.max_iterations,
    )))
}

async fn conversation_loop(router: Arc<Router>, initial_session: Option<String>) -> Result<()> {
    println!(
        "{}",
        "Concierge ready. Type 'quit' or 'exit' to stop.".bright_green()
    );
    println!();

    let mut session_key = initial_session;

    loop {
        print!("{}", "You: ".bright_cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit") {
            println!("{}", "Goodbye!".bright_green());
            break;
        }

        match router.handle(input, session_key.as_deref()).await {
            Ok((reply, key)) => {
                session_key = Some(key);
                println!("{} {}", "Concierge:".bright_green().bold(), reply);
            }
            Err(e) => {
                println!("{}", format!("Error: {}", e).red());
            }
        }

        println!();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = ConciergeConfig::from_env();
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(registry) = &args.registry {
        config.registry_path = registry.to_string_lossy().into_owned();
    }

    println!(
        "{} {}",
        "Provider:".bright_yellow(),
        config.provider.bright_blue()
    );
    println!(
        "{} {}",
        "Registry:".bright_yellow(),
        config.registry_path.bright_blue()
    );
    println!();

    let router = build_router(&config).await?;
    conversation_loop(router, args.session).await
}
