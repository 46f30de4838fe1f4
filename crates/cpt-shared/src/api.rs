//! Request and response payloads for the cptd HTTP API.

use crate::analysis::ProcedureAnalysis;
use crate::code::CodeDetails;
use crate::conversation::SessionSummary;
use serde::{Deserialize, Serialize};

/// Request to process a natural-language coding query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Existing session to continue; a new one is created when absent or unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Answer to a coding query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    /// CPT codes extracted from the answer
    pub codes: Vec<String>,
    /// Rules-engine analysis of the extracted codes, when any were found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProcedureAnalysis>,
    pub session_id: String,
}

/// Request to search the code table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub search_term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub codes: Vec<CodeDetails>,
    pub count: usize,
}

/// Request to validate a single CPT code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

/// Request to run the rules engine over a procedure description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub procedure_text: String,
    /// Candidate codes; searched from the description when not supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Daemon health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: String,
    pub llm_available: bool,
    pub database: String,
    pub codes_loaded: usize,
    pub key_indicators_loaded: usize,
    pub standard_charges_loaded: usize,
    pub conversation_dir: String,
}
