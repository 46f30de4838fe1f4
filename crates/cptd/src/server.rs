//! HTTP server for cptd.

use crate::agent::CptAgent;
use crate::config::ServerConfig;
use crate::routes;
use anyhow::Result;
use axum::Router;
use cpt_shared::ConversationStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub agent: CptAgent,
    pub store: RwLock<ConversationStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(agent: CptAgent, store: ConversationStore) -> Self {
        Self {
            agent,
            store: RwLock::new(store),
            start_time: Instant::now(),
        }
    }
}

/// Build the full API router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::query_routes())
        .merge(routes::code_routes())
        .merge(routes::session_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(state: AppState, server: &ServerConfig) -> Result<()> {
    let app = app(Arc::new(state));

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
