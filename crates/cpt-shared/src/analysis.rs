//! Rules-engine analysis payloads.

use serde::{Deserialize, Serialize};

/// Human-readable explanation attached to a rule decision.
///
/// `code` is absent for procedure-level findings (post-op visit detection,
/// medical-necessity reminders) that do not target a specific candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExplanation {
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl RuleExplanation {
    pub fn for_code(
        rule_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn general(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            code: None,
            message: message.into(),
        }
    }
}

/// Outcome of running the coding rules over a candidate code set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureAnalysis {
    pub procedure_text: String,
    pub recommended_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_codes: Vec<String>,
    #[serde(default)]
    pub bilateral: bool,
    #[serde(default)]
    pub multiple_procedures: bool,
    #[serde(default)]
    pub bundled_codes: bool,
    pub explanations: Vec<RuleExplanation>,
}
