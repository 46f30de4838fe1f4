//! Error types for the CPT agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CptAgentError {
    #[error("No candidate codes provided for analysis")]
    NoCandidates,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
