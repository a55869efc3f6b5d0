//! Study-concept tournament server
//!
//! # Usage
//!
//! ```bash
//! # In-memory, local OpenAI-compatible endpoint
//! concept-server
//!
//! # Persistent state and a config file
//! concept-server --config concept-server.toml --state-path ./state/concepts.json
//!
//! # Endpoint from the environment
//! CONCEPT_LLM_BASE_URL=https://api.openai.com/v1 CONCEPT_LLM_API_KEY=... concept-server
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use concept_server::llm::{prompts::PROMPT_VERSION, ChatClient, LlmExpertReviewer, LlmIdeaGenerator};
use concept_server::{build_router, ServerConfig};
use tournament_engine::{EventBus, IdeaStore, TournamentController};
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides CONCEPT_BIND and the config file)
    #[arg(long)]
    bind: Option<String>,

    /// JSON snapshot of the idea store (overrides CONCEPT_STATE_PATH)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Concurrent LLM calls across all tournaments
    #[arg(long)]
    max_concurrent_calls: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concept_server=info,tournament_engine=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(path) = args.state_path {
        config.state_path = Some(path);
    }
    if let Some(calls) = args.max_concurrent_calls {
        config.engine.max_concurrent_calls = calls;
    }
    config.validate()?;

    let store = match &config.state_path {
        Some(path) => IdeaStore::open(path)
            .with_context(|| format!("Failed to open idea store at {}", path.display()))?,
        None => {
            warn!("No state path configured, tournaments are kept in memory only");
            IdeaStore::in_memory()
        }
    }
    .shared();

    let client = Arc::new(
        ChatClient::new(config.llm.clone()).context("Failed to build LLM HTTP client")?,
    );
    let controller = TournamentController::new(
        config.engine.clone(),
        store,
        EventBus::new().shared(),
        Arc::new(LlmIdeaGenerator::new(client.clone())),
        Arc::new(LlmExpertReviewer::new(client)),
    )
    .context("Invalid engine configuration")?
    .shared();

    let interrupted = controller.recover()?;
    if !interrupted.is_empty() {
        info!(count = interrupted.len(), "Recovered state from previous run");
    }

    let app = build_router(controller.clone(), &config.allowed_origins);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    info!(
        bind = %config.bind,
        llm = %config.llm.completions_url(),
        model = %config.llm.model,
        reviewers = config.engine.reviewers.len(),
        prompt_version = PROMPT_VERSION,
        "Concept server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    controller.store().flush()?;
    Ok(())
}
