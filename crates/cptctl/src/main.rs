//! cptctl - CLI client for the ENT CPT coding agent.
//!
//! Talks to a running cptd over its HTTP API.

mod client;
mod commands;
mod repl;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::CptdClient;

#[derive(Parser)]
#[command(name = "cptctl")]
#[command(about = "ENT CPT coding agent - CLI client", long_about = None)]
#[command(version)]
struct Cli {
    /// Base URL of the cptd API
    #[arg(long, default_value = cpt_shared::DEFAULT_API_URL)]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive coding session
    Chat {
        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
    },

    /// Ask a single coding question
    Ask {
        /// The question to ask
        query: String,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,
    },

    /// Search the code table
    Search {
        /// Search term
        term: String,

        /// Maximum results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Look up and validate a CPT code
    Code {
        /// The 5-digit CPT code
        code: String,
    },

    /// Run the coding rules over a procedure description
    Analyze {
        /// Procedure description
        procedure: String,

        /// Candidate codes (comma-separated); searched from the text when omitted
        #[arg(long)]
        codes: Option<String>,
    },

    /// List saved conversation sessions
    Sessions,

    /// Show daemon health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = CptdClient::new(cli.api_url);

    match cli.command {
        Commands::Chat { session } => repl::run(&client, session).await,
        Commands::Ask { query, session } => commands::ask(&client, &query, session).await,
        Commands::Search { term, limit } => commands::search(&client, &term, limit).await,
        Commands::Code { code } => commands::code(&client, &code).await,
        Commands::Analyze { procedure, codes } => {
            commands::analyze(&client, &procedure, codes).await
        }
        Commands::Sessions => commands::sessions(&client).await,
        Commands::Health => commands::health(&client).await,
    }
}
