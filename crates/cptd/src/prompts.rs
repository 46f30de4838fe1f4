//! Prompt assembly for the coding agent.
//!
//! Enforces a size cap on the candidate listing so a pathological search
//! result cannot blow up the context window.

use cpt_shared::CodeDetails;

/// Cap on the candidate block embedded in the system prompt
const MAX_CANDIDATE_BLOCK_CHARS: usize = 4_096;

/// Prompt asking the model to translate a lay query into coding terminology
pub fn translate_prompt(query: &str) -> String {
    format!(
        "Translate the following query into specific otolaryngology procedure \
         terminology for CPT coding purposes. Focus on exact procedure names, \
         anatomical sites, and technical terms used in ENT CPT coding. Be concise. \
         Do not add any preamble or conclusion. Use standard medical terminology. \
         Query: {}",
        query
    )
}

/// System prompt grounding the model in the retrieved candidate codes
pub fn system_prompt(candidates: &[CodeDetails]) -> String {
    let mut block = String::new();
    let mut omitted = 0usize;
    for candidate in candidates {
        let line = format!(
            "- Code: {}, Description: {}, Category: {}, Key Indicator: {}, \
             Standard Charge: ${:.2}\n",
            candidate.code,
            candidate.description,
            candidate.category,
            if candidate.key_indicator { "Yes" } else { "No" },
            candidate.standard_charge,
        );
        if block.len() + line.len() > MAX_CANDIDATE_BLOCK_CHARS {
            omitted += 1;
            continue;
        }
        block.push_str(&line);
    }
    if omitted > 0 {
        block.push_str(&format!("... ({} more candidates omitted)\n", omitted));
    }

    format!(
        "You are the ENT CPT Code Agent, an AI specializing in ENT CPT coding. \
         Using the following relevant CPT codes identified by the code search, \
         select and recommend MULTIPLE appropriate codes that could be applicable \
         to the procedure:\n{}\n\
         Always provide at least 2-3 possible CPT codes with explanations for each. \
         Start with the most appropriate code, then provide alternatives that could \
         also apply. Prioritize Key Indicator codes, but include other relevant \
         options. Format your response with clear headings for each CPT code option \
         (e.g., 'OPTION 1: CPT 42420', 'OPTION 2: CPT 42425'). Always include the \
         CPT code numbers in your response, and explain when each would be \
         appropriate.",
        block
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, description: &str) -> CodeDetails {
        CodeDetails {
            code: code.to_string(),
            description: description.to_string(),
            category: "Nose".to_string(),
            subspecialty: String::new(),
            related_codes: Vec::new(),
            key_indicator: false,
            standard_charge: 850.0,
        }
    }

    #[test]
    fn test_translate_prompt_includes_query() {
        let prompt = translate_prompt("my kid needs ear tubes");
        assert!(prompt.contains("my kid needs ear tubes"));
        assert!(prompt.contains("otolaryngology"));
    }

    #[test]
    fn test_system_prompt_lists_candidates() {
        let prompt = system_prompt(&[candidate("31231", "Nasal endoscopy, diagnostic")]);
        assert!(prompt.contains("Code: 31231"));
        assert!(prompt.contains("Standard Charge: $850.00"));
        assert!(prompt.contains("OPTION 1"));
    }

    #[test]
    fn test_candidate_block_is_capped() {
        let big: Vec<CodeDetails> = (0..500)
            .map(|i| candidate(&format!("{:05}", i), &"nasal endoscopy ".repeat(10)))
            .collect();
        let prompt = system_prompt(&big);
        assert!(prompt.len() < MAX_CANDIDATE_BLOCK_CHARS + 2_000);
        assert!(prompt.contains("more candidates omitted"));
    }
}
