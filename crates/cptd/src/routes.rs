//! API routes for cptd.

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use cpt_shared::api::{
    AnalyzeRequest, HealthResponse, NewSessionResponse, QueryRequest, QueryResponse,
    SearchRequest, SearchResponse, SessionListResponse, ValidateRequest,
};
use cpt_shared::{CodeDetails, CodeValidation, CptAgentError, ProcedureAnalysis};
use std::sync::Arc;
use tracing::{error, info};

type AppStateArc = Arc<AppState>;

// ============================================================================
// Query Routes
// ============================================================================

pub fn query_routes() -> Router<AppStateArc> {
    Router::new().route("/api/query", post(query))
}

async fn query(
    State(state): State<AppStateArc>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No query provided".to_string()));
    }
    info!("  Query: {}", req.query);

    // Continue the session when known, otherwise start a fresh one
    let mut conversation = {
        let mut store = state.store.write().await;
        match req
            .session_id
            .as_deref()
            .and_then(|id| store.get(id).cloned())
        {
            Some(conversation) => conversation,
            None => store.create().map_err(internal)?,
        }
    };

    let outcome = state.agent.process_query(&req.query, &mut conversation).await;

    {
        let mut store = state.store.write().await;
        store.save(&conversation).map_err(internal)?;
    }

    Ok(Json(QueryResponse {
        answer: outcome.answer,
        codes: outcome.codes,
        analysis: outcome.analysis,
        session_id: conversation.session_id,
    }))
}

// ============================================================================
// Code Routes
// ============================================================================

pub fn code_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/search", post(search))
        .route("/api/validate", post(validate))
        .route("/api/analyze", post(analyze))
        .route("/api/codes/:code", get(code_details))
}

async fn code_details(
    State(state): State<AppStateArc>,
    Path(code): Path<String>,
) -> Result<Json<CodeDetails>, (StatusCode, String)> {
    state
        .agent
        .database()
        .details(&code)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("CPT code {} not found", code)))
}

async fn search(
    State(state): State<AppStateArc>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    if req.search_term.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "No search term provided".to_string(),
        ));
    }

    let limit = req
        .limit
        .unwrap_or(state.agent.config().agent.search_limit);
    let codes = state.agent.database().search(&req.search_term, limit);

    Ok(Json(SearchResponse {
        count: codes.len(),
        codes,
    }))
}

async fn validate(
    State(state): State<AppStateArc>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<CodeValidation>, (StatusCode, String)> {
    if req.code.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No code provided".to_string()));
    }
    info!("  Validating CPT code: {}", req.code);
    Ok(Json(state.agent.database().validate(&req.code)))
}

async fn analyze(
    State(state): State<AppStateArc>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ProcedureAnalysis>, (StatusCode, String)> {
    if req.procedure_text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "No procedure text provided".to_string(),
        ));
    }

    state
        .agent
        .analyze_procedure(&req.procedure_text, req.candidate_codes)
        .map(Json)
        .map_err(|e| match e {
            CptAgentError::NoCandidates => (StatusCode::BAD_REQUEST, e.to_string()),
            other => {
                error!("Analysis failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        })
}

// ============================================================================
// Session Routes
// ============================================================================

pub fn session_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/new_session", post(new_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", delete(delete_session))
}

async fn new_session(
    State(state): State<AppStateArc>,
) -> Result<Json<NewSessionResponse>, (StatusCode, String)> {
    let mut store = state.store.write().await;
    let conversation = store.create().map_err(internal)?;
    info!("  Created session {}", conversation.session_id);
    Ok(Json(NewSessionResponse {
        session_id: conversation.session_id,
    }))
}

async fn list_sessions(State(state): State<AppStateArc>) -> Json<SessionListResponse> {
    let store = state.store.read().await;
    Json(SessionListResponse {
        sessions: store.list(),
    })
}

async fn delete_session(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut store = state.store.write().await;
    match store.delete(&id).map_err(internal)? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err((StatusCode::NOT_FOUND, format!("Unknown session: {}", id))),
    }
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/api/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    Json(state.agent.health(uptime).await)
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Internal error: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
