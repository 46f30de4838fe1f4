//! Integration tests for the cptd HTTP API.
//!
//! Everything here runs without an LLM backend: query turns degrade to the
//! apology path, and the code/session endpoints are fully deterministic.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cpt_shared::api::{
    HealthResponse, NewSessionResponse, QueryResponse, SearchResponse, SessionListResponse,
};
use cpt_shared::{CodeDetails, CodeValidation, ConversationStore, ProcedureAnalysis};
use cptd::agent::CptAgent;
use cptd::config::Config;
use cptd::server::{app, AppState};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const TEST_TABLE: &str = "\
cpt_code,description,category,subspecialty,related_codes,key_indicator,standard_charge
31231,\"Nasal endoscopy, diagnostic\",Nose,Rhinology,\"31233, 31235\",No,850.00
31233,Nasal endoscopy with maxillary sinusoscopy,Nose,Rhinology,31231,No,975.50
69436,\"Tympanostomy with tubes, general anesthesia\",Ear,Otology,69433,Yes,2150.00
42820,\"Tonsillectomy and adenoidectomy, under age 12\",Throat,,,No,1650.00
30520,Septoplasty,Nose,Rhinology,30930,No,1800.00
";

/// Router wired to a throwaway database and conversation dir. The LLM
/// backend points at a port nothing listens on.
fn test_app(dir: &TempDir) -> Router {
    let table_path = dir.path().join("codes.csv");
    std::fs::write(&table_path, TEST_TABLE).unwrap();
    let conversation_dir = dir.path().join("conversations");

    let mut config = Config::default();
    config.database.file_path = table_path.to_string_lossy().into_owned();
    config.agent.conversation_dir = conversation_dir.to_string_lossy().into_owned();
    config.llm.base_url = "http://127.0.0.1:1/v1".to_string();
    config.llm.request_timeout_secs = 2;

    let store = ConversationStore::open(&conversation_dir).unwrap();
    let agent = CptAgent::new(config).unwrap();
    app(Arc::new(AppState::new(agent, store)))
}

async fn send(
    router: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let request = match body {
        Some(json) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn parse<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn health_reports_database_stats() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(test_app(&dir), "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = parse(&body);
    assert_eq!(health.codes_loaded, 5);
    assert_eq!(health.key_indicators_loaded, 1);
    assert!(!health.llm_available);
    assert_eq!(health.status, "degraded");
}

#[tokio::test]
async fn search_finds_codes() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        test_app(&dir),
        "POST",
        "/api/search",
        Some(serde_json::json!({"search_term": "endoscopy"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let results: SearchResponse = parse(&body);
    assert_eq!(results.count, 2);
}

#[tokio::test]
async fn search_rejects_empty_term() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(
        test_app(&dir),
        "POST",
        "/api/search",
        Some(serde_json::json!({"search_term": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validate_known_and_unknown_codes() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(
        app.clone(),
        "POST",
        "/api/validate",
        Some(serde_json::json!({"code": "69436"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let validation: CodeValidation = parse(&body);
    assert!(validation.valid);

    let (status, body) = send(
        app,
        "POST",
        "/api/validate",
        Some(serde_json::json!({"code": "99999"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let validation: CodeValidation = parse(&body);
    assert!(!validation.valid);
}

#[tokio::test]
async fn code_details_endpoint() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(app.clone(), "GET", "/api/codes/31231", None).await;
    assert_eq!(status, StatusCode::OK);
    let details: CodeDetails = parse(&body);
    assert_eq!(details.related_codes, vec!["31233", "31235"]);

    let (status, _) = send(app, "GET", "/api/codes/99999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analyze_applies_bilateral_modifier() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        test_app(&dir),
        "POST",
        "/api/analyze",
        Some(serde_json::json!({
            "procedure_text": "Bilateral tympanostomy with tubes",
            "candidate_codes": ["69436"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let analysis: ProcedureAnalysis = parse(&body);
    assert!(analysis.bilateral);
    assert_eq!(analysis.recommended_codes, vec!["69436-50"]);
}

#[tokio::test]
async fn analyze_searches_candidates_when_absent() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(
        test_app(&dir),
        "POST",
        "/api/analyze",
        Some(serde_json::json!({"procedure_text": "Septoplasty"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let analysis: ProcedureAnalysis = parse(&body);
    assert_eq!(analysis.recommended_codes, vec!["30520"]);
}

#[tokio::test]
async fn analyze_with_no_matches_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(
        test_app(&dir),
        "POST",
        "/api/analyze",
        Some(serde_json::json!({"procedure_text": "cardiac catheterization"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_lifecycle() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(app.clone(), "POST", "/api/new_session", None).await;
    assert_eq!(status, StatusCode::OK);
    let created: NewSessionResponse = parse(&body);

    let (status, body) = send(app.clone(), "GET", "/api/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed: SessionListResponse = parse(&body);
    assert!(listed
        .sessions
        .iter()
        .any(|s| s.session_id == created.session_id));

    let uri = format!("/api/sessions/{}", created.session_id);
    let (status, _) = send(app.clone(), "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn query_without_llm_degrades_to_apology() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, body) = send(
        app.clone(),
        "POST",
        "/api/query",
        Some(serde_json::json!({"query": "What code covers a septoplasty?"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: QueryResponse = parse(&body);
    assert!(response.answer.contains("I apologize"));
    assert!(response.codes.is_empty());

    // The turn is still persisted in the session
    let (_, body) = send(app, "GET", "/api/sessions", None).await;
    let listed: SessionListResponse = parse(&body);
    let session = listed
        .sessions
        .iter()
        .find(|s| s.session_id == response.session_id)
        .expect("session should be persisted");
    assert_eq!(session.total_messages, 2);
}

#[tokio::test]
async fn query_rejects_empty_body() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(
        test_app(&dir),
        "POST",
        "/api/query",
        Some(serde_json::json!({"query": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
