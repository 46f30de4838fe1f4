//! HTTP client for the cptd API.

use anyhow::{anyhow, Result};
use cpt_shared::api::{
    AnalyzeRequest, HealthResponse, NewSessionResponse, QueryRequest, QueryResponse,
    SearchRequest, SearchResponse, SessionListResponse, ValidateRequest,
};
use cpt_shared::{CodeDetails, CodeValidation, ProcedureAnalysis, SessionSummary};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Client for a running cptd
pub struct CptdClient {
    client: reqwest::Client,
    base_url: String,
}

impl CptdClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn query(
        &self,
        query: &str,
        session_id: Option<String>,
    ) -> Result<QueryResponse> {
        self.post(
            "/api/query",
            &QueryRequest {
                query: query.to_string(),
                session_id,
            },
        )
        .await
    }

    pub async fn search(&self, term: &str, limit: Option<usize>) -> Result<SearchResponse> {
        self.post(
            "/api/search",
            &SearchRequest {
                search_term: term.to_string(),
                limit,
            },
        )
        .await
    }

    pub async fn validate(&self, code: &str) -> Result<CodeValidation> {
        self.post(
            "/api/validate",
            &ValidateRequest {
                code: code.to_string(),
            },
        )
        .await
    }

    pub async fn analyze(
        &self,
        procedure_text: &str,
        candidate_codes: Option<Vec<String>>,
    ) -> Result<ProcedureAnalysis> {
        self.post(
            "/api/analyze",
            &AnalyzeRequest {
                procedure_text: procedure_text.to_string(),
                candidate_codes,
            },
        )
        .await
    }

    /// Full details for a code, or None when the daemon does not know it
    pub async fn details(&self, code: &str) -> Result<Option<CodeDetails>> {
        let response = self
            .client
            .get(format!("{}/api/codes/{}", self.base_url, code))
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::decode(response).await?))
    }

    pub async fn new_session(&self) -> Result<String> {
        let resp: NewSessionResponse = self
            .post("/api/new_session", &serde_json::json!({}))
            .await?;
        Ok(resp.session_id)
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let resp: SessionListResponse = self.get("/api/sessions").await?;
        Ok(resp.sessions)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/api/health").await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, e))?;
        Self::decode(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, e))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("cptd returned {}: {}", status, body));
        }
        Ok(response.json().await?)
    }
}

fn connection_error(base_url: &str, e: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "Cannot reach cptd at {}: {}\n\n\
         Is the daemon running? Start it with:\n\
         cptd --config config.toml",
        base_url,
        e
    )
}
