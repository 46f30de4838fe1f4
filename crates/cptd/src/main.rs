//! cptd - ENT CPT coding agent daemon.
//!
//! Loads the code table, wires the rules engine and LLM client, and serves
//! the HTTP API.

use anyhow::Result;
use clap::Parser;
use cpt_shared::ConversationStore;
use cptd::agent::CptAgent;
use cptd::config::{Config, CONFIG_PATH};
use cptd::server::{self, AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cptd")]
#[command(about = "ENT CPT coding agent daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: String,

    /// Host to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Path to the CPT code table (overrides config)
    #[arg(long)]
    database: Option<String>,

    /// Log filter, e.g. "info" or "cptd=debug" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("cptd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&args.config);
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(database) = args.database {
        config.database.file_path = database;
    }

    let store = ConversationStore::open(&config.agent.conversation_dir)?;
    info!(
        "Loaded {} conversation session(s) from {}",
        store.len(),
        config.agent.conversation_dir
    );

    let server_config = config.server.clone();
    let agent = CptAgent::new(config)?;

    if !agent.llm_available().await {
        warn!(
            "LLM backend at {} is not reachable; queries will fail until it is up",
            agent.config().llm.base_url
        );
    }

    let state = AppState::new(agent, store);
    server::run(state, &server_config).await
}
