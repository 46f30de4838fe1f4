//! Shared types and utilities for the ENT CPT coding agent.
//!
//! Everything that crosses the cptd/cptctl boundary lives here: the API
//! payloads, the conversation model and its file-backed store, CPT code
//! extraction, and the error type.

pub mod analysis;
pub mod api;
pub mod code;
pub mod conversation;
pub mod error;

pub use analysis::{ProcedureAnalysis, RuleExplanation};
pub use code::{base_code, extract_codes, CodeDetails, CodeValidation};
pub use conversation::{
    Conversation, ConversationMessage, ConversationStore, Role, SessionSummary,
};
pub use error::CptAgentError;

/// Default address of the cptd HTTP API
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Default directory for persisted conversation sessions
pub const DEFAULT_CONVERSATION_DIR: &str = "conversations";
