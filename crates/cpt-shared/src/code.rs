//! CPT code payload types and free-text code extraction.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Detailed information about a single CPT code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeDetails {
    pub code: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subspecialty: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_codes: Vec<String>,
    #[serde(default)]
    pub key_indicator: bool,
    #[serde(default)]
    pub standard_charge: f64,
}

/// Result of validating a CPT code against the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeValidation {
    pub valid: bool,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CodeValidation {
    pub fn valid(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            valid: true,
            code: code.into(),
            description: Some(description.into()),
            error: None,
        }
    }

    pub fn invalid(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            valid: false,
            error: Some(format!("Invalid CPT code: {}", code)),
            code,
            description: None,
        }
    }
}

/// Extract CPT codes from free text, in order of appearance, deduplicated.
///
/// Matches 5-digit codes with up to two `-NN` modifier suffixes ("69436-50",
/// "69436-50-51") and the `F`/`T` suffixed tracking codes.
pub fn extract_codes(text: &str) -> Vec<String> {
    let pattern = Regex::new(r"\b\d{5}(?:-\d{1,2}(?:-\d{1,2})?|[FT])?\b").unwrap();
    let mut seen = Vec::new();
    for m in pattern.find_iter(text) {
        let code = m.as_str().to_string();
        if !seen.contains(&code) {
            seen.push(code);
        }
    }
    seen
}

/// Strip any modifier suffix, returning the 5-digit base code.
pub fn base_code(code: &str) -> &str {
    match code.find('-') {
        Some(idx) => &code[..idx],
        None => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_codes() {
        let codes = extract_codes("Consider CPT 31231 or 31233 for this procedure.");
        assert_eq!(codes, vec!["31231", "31233"]);
    }

    #[test]
    fn test_extract_with_modifier() {
        let codes = extract_codes("Bill 69436-50 for the bilateral case.");
        assert_eq!(codes, vec!["69436-50"]);
    }

    #[test]
    fn test_extract_dedups_preserving_order() {
        let codes = extract_codes("OPTION 1: 42820. OPTION 2: 42821. As noted, 42820 is primary.");
        assert_eq!(codes, vec!["42820", "42821"]);
    }

    #[test]
    fn test_extract_ignores_short_numbers() {
        assert!(extract_codes("The patient is 42 years old, seen in 2024.").is_empty());
    }

    #[test]
    fn test_base_code_strips_modifier() {
        assert_eq!(base_code("69436-50"), "69436");
        assert_eq!(base_code("31231"), "31231");
    }

    #[test]
    fn test_validation_constructors() {
        let ok = CodeValidation::valid("31231", "Nasal endoscopy, diagnostic");
        assert!(ok.valid);
        assert!(ok.error.is_none());

        let bad = CodeValidation::invalid("99999");
        assert!(!bad.valid);
        assert!(bad.error.unwrap().contains("99999"));
    }
}
