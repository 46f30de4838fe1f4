//! Coding-policy rules applied to candidate CPT codes.
//!
//! Deterministic post-processing of LLM-suggested codes: bundling,
//! bilateral/multiple-procedure modifiers, post-op detection, and
//! medical-necessity reminders. Rules run in priority order, highest first.

use crate::codes::CodeDatabase;
use cpt_shared::{CptAgentError, ProcedureAnalysis, RuleExplanation};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Modifier appended for bilateral procedures
pub const BILATERAL_MODIFIER: &str = "50";

/// Modifier appended to secondary procedures
pub const MULTIPLE_PROCEDURE_MODIFIER: &str = "51";

const BILATERAL_KEYWORDS: &[&str] = &["bilateral", "both sides", "both ears", "right and left"];

const POST_OP_KEYWORDS: &[&str] = &["follow-up", "post-op", "postoperative"];

const MULTIPLE_PROCEDURE_PATTERNS: &[&str] =
    &[r"\bmultiple\s+procedures\b", r"\bseveral\s+procedures\b"];

/// How a rule decides whether it applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCondition {
    /// Sort candidates by key-indicator status and standard charge
    KeyIndicatorPriority,
    /// Exclude codes bundled with another candidate
    BundledCodes,
    /// Procedure text mentions a post-operative visit
    PostOpKeywords,
    /// Procedure text indicates a bilateral procedure
    BilateralKeywords,
    /// Procedure text indicates multiple distinct procedures
    MultipleProcedures,
    /// Documentation reminder, always applies
    MedicalNecessity,
}

/// A rule for CPT code selection
#[derive(Debug, Clone)]
pub struct CodeRule {
    pub rule_id: String,
    pub description: String,
    pub condition: RuleCondition,
    pub priority: i32,
}

impl CodeRule {
    pub fn new(
        rule_id: impl Into<String>,
        description: impl Into<String>,
        condition: RuleCondition,
        priority: i32,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            description: description.into(),
            condition,
            priority,
        }
    }
}

impl std::fmt::Display for CodeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rule {}: {} (priority {})",
            self.rule_id, self.description, self.priority
        )
    }
}

/// Rules engine for CPT code selection
pub struct RulesEngine {
    rules: Vec<CodeRule>,
}

impl RulesEngine {
    /// Engine with the default ENT coding rules
    pub fn new() -> Self {
        let mut engine = Self { rules: Vec::new() };
        engine.rules.push(CodeRule::new(
            "R000",
            "Prioritize key indicator codes and higher standard charges",
            RuleCondition::KeyIndicatorPriority,
            100,
        ));
        engine.rules.push(CodeRule::new(
            "R001",
            "Check for bundled procedures",
            RuleCondition::BundledCodes,
            10,
        ));
        engine.rules.push(CodeRule::new(
            "R003",
            "Check for post-operative visits (usually included in surgical package)",
            RuleCondition::PostOpKeywords,
            9,
        ));
        engine.rules.push(CodeRule::new(
            "R002",
            "Check for bilateral procedures (use modifier 50)",
            RuleCondition::BilateralKeywords,
            8,
        ));
        engine.rules.push(CodeRule::new(
            "R004",
            "Check for multiple procedures (additional procedures may require modifier 51)",
            RuleCondition::MultipleProcedures,
            7,
        ));
        engine.rules.push(CodeRule::new(
            "R005",
            "Verify medical necessity documentation",
            RuleCondition::MedicalNecessity,
            6,
        ));
        engine.sort_rules();
        info!("Initialized {} CPT coding rules", engine.rules.len());
        engine
    }

    /// Add a rule; the table stays sorted highest priority first
    pub fn add_rule(&mut self, rule: CodeRule) {
        info!("Added rule: {}", rule);
        self.rules.push(rule);
        self.sort_rules();
    }

    fn sort_rules(&mut self) {
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rules(&self) -> &[CodeRule] {
        &self.rules
    }

    /// Rule id → description map
    pub fn rule_explanations(&self) -> BTreeMap<String, String> {
        self.rules
            .iter()
            .map(|r| (r.rule_id.clone(), r.description.clone()))
            .collect()
    }

    /// Apply all rules to a procedure description and candidate code list.
    ///
    /// Candidates unknown to the database are dropped during
    /// prioritization, matching the lookup-or-skip behavior everywhere
    /// else in the engine.
    pub fn analyze(
        &self,
        procedure_text: &str,
        candidate_codes: &[String],
        db: &CodeDatabase,
    ) -> Result<ProcedureAnalysis, CptAgentError> {
        info!("Analyzing procedure: {}", procedure_text);
        if candidate_codes.is_empty() {
            return Err(CptAgentError::NoCandidates);
        }

        let mut recommended: Vec<String> = candidate_codes.to_vec();
        let mut excluded: Vec<String> = Vec::new();
        let mut explanations: Vec<RuleExplanation> = Vec::new();
        let mut bilateral = false;
        let mut multiple = false;
        let mut bundled = false;

        for rule in &self.rules {
            match rule.condition {
                RuleCondition::KeyIndicatorPriority => {
                    let (rec, exp) = self.prioritize_by_key_indicator_and_charge(&recommended, db);
                    recommended = rec;
                    explanations.extend(exp);
                }
                RuleCondition::BundledCodes => {
                    let (rec, exc, exp) = self.evaluate_bundled_codes(&recommended, db);
                    bundled = !exc.is_empty();
                    recommended = rec;
                    excluded.extend(exc);
                    explanations.extend(exp);
                }
                RuleCondition::PostOpKeywords => {
                    if let Some(exp) = self.evaluate_post_op(procedure_text) {
                        explanations.push(exp);
                    }
                }
                RuleCondition::BilateralKeywords => {
                    let (rec, exp, is_bilateral) =
                        self.evaluate_bilateral_procedures(procedure_text, &recommended);
                    recommended = rec;
                    explanations.extend(exp);
                    bilateral = is_bilateral;
                }
                RuleCondition::MultipleProcedures => {
                    let (rec, exp, is_multiple) =
                        self.evaluate_multiple_procedures(procedure_text, &recommended);
                    recommended = rec;
                    explanations.extend(exp);
                    multiple = is_multiple;
                }
                RuleCondition::MedicalNecessity => {
                    explanations.push(RuleExplanation::general(
                        rule.rule_id.clone(),
                        "Ensure the documentation supports medical necessity for every \
                         recommended code.",
                    ));
                }
            }
        }

        info!("Analysis complete. Recommended codes: {:?}", recommended);
        Ok(ProcedureAnalysis {
            procedure_text: procedure_text.to_string(),
            recommended_codes: recommended,
            excluded_codes: excluded,
            bilateral,
            multiple_procedures: multiple,
            bundled_codes: bundled,
            explanations,
        })
    }

    /// Sort candidates key-indicators first, then by descending standard
    /// charge. Explains the top three. Unknown codes are dropped.
    fn prioritize_by_key_indicator_and_charge(
        &self,
        candidates: &[String],
        db: &CodeDatabase,
    ) -> (Vec<String>, Vec<RuleExplanation>) {
        let mut details: Vec<_> = candidates.iter().filter_map(|c| db.details(c)).collect();
        if details.len() < candidates.len() {
            warn!(
                "Dropped {} unknown candidate code(s) during prioritization",
                candidates.len() - details.len()
            );
        }

        details.sort_by(|a, b| {
            b.key_indicator.cmp(&a.key_indicator).then_with(|| {
                b.standard_charge
                    .partial_cmp(&a.standard_charge)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let explanations = details
            .iter()
            .take(3)
            .map(|d| {
                let message = if d.key_indicator && d.standard_charge > 0.0 {
                    format!(
                        "Code {} is a key indicator with standard charge ${:.2}",
                        d.code, d.standard_charge
                    )
                } else if d.key_indicator {
                    format!("Code {} is a key indicator", d.code)
                } else if d.standard_charge > 0.0 {
                    format!(
                        "Code {} has standard charge ${:.2}",
                        d.code, d.standard_charge
                    )
                } else {
                    format!("Code {} evaluated based on priority rules", d.code)
                };
                RuleExplanation::for_code("R000", d.code.clone(), message)
            })
            .collect();

        (details.into_iter().map(|d| d.code).collect(), explanations)
    }

    /// Keep the first-seen code of each bundled pair, exclude its partners.
    /// Each unordered pair is processed once.
    fn evaluate_bundled_codes(
        &self,
        candidates: &[String],
        db: &CodeDatabase,
    ) -> (Vec<String>, Vec<String>, Vec<RuleExplanation>) {
        let mut recommended: Vec<String> = Vec::new();
        let mut excluded: Vec<String> = Vec::new();
        let mut explanations: Vec<RuleExplanation> = Vec::new();
        let mut processed_pairs: HashSet<(String, String)> = HashSet::new();

        for code in candidates {
            let related = db.related_codes(code);
            if related.is_empty() && db.details(code).is_none() {
                continue;
            }

            let mut bundled_with: Vec<String> = Vec::new();
            for partner in related {
                if candidates.contains(&partner) {
                    let pair = pair_key(code, &partner);
                    if processed_pairs.insert(pair) {
                        bundled_with.push(partner);
                    }
                }
            }

            if !bundled_with.is_empty() {
                explanations.push(RuleExplanation::for_code(
                    "R001",
                    code.clone(),
                    format!(
                        "Code {} may be bundled with {}. Check coding guidelines to \
                         determine which code to use.",
                        code,
                        bundled_with.join(", ")
                    ),
                ));
                if !excluded.contains(code) {
                    recommended.push(code.clone());
                    excluded.extend(bundled_with);
                }
            } else if !excluded.contains(code) && !recommended.contains(code) {
                recommended.push(code.clone());
            }
        }

        (recommended, excluded, explanations)
    }

    /// Append modifier 50 to every candidate when the description indicates
    /// a bilateral procedure.
    fn evaluate_bilateral_procedures(
        &self,
        procedure_text: &str,
        candidates: &[String],
    ) -> (Vec<String>, Vec<RuleExplanation>, bool) {
        let text = procedure_text.to_lowercase();
        let is_bilateral = BILATERAL_KEYWORDS.iter().any(|k| text.contains(k));
        if !is_bilateral {
            return (candidates.to_vec(), Vec::new(), false);
        }

        let mut modified = Vec::new();
        let mut explanations = Vec::new();
        for code in candidates {
            modified.push(format!("{}-{}", code, BILATERAL_MODIFIER));
            explanations.push(RuleExplanation::for_code(
                "R002",
                code.clone(),
                format!("Added modifier 50 to code {} for bilateral procedure.", code),
            ));
        }
        (modified, explanations, true)
    }

    /// Flag post-operative visits; the visit is usually part of the surgical
    /// package, so this explains rather than drops codes.
    fn evaluate_post_op(&self, procedure_text: &str) -> Option<RuleExplanation> {
        let text = procedure_text.to_lowercase();
        let matched = POST_OP_KEYWORDS.iter().find(|k| text.contains(*k))?;
        Some(RuleExplanation::general(
            "R003",
            format!(
                "Description mentions '{}': post-operative visits are usually included \
                 in the surgical package and not billed separately.",
                matched
            ),
        ))
    }

    /// Append modifier 51 to every candidate after the first when the
    /// description explicitly mentions multiple procedures.
    fn evaluate_multiple_procedures(
        &self,
        procedure_text: &str,
        candidates: &[String],
    ) -> (Vec<String>, Vec<RuleExplanation>, bool) {
        let text = procedure_text.to_lowercase();
        let is_multiple = MULTIPLE_PROCEDURE_PATTERNS
            .iter()
            .any(|p| Regex::new(p).unwrap().is_match(&text));
        if !is_multiple || candidates.len() < 2 {
            return (candidates.to_vec(), Vec::new(), is_multiple);
        }

        let mut modified = Vec::new();
        let mut explanations = Vec::new();
        for (idx, code) in candidates.iter().enumerate() {
            if idx == 0 {
                modified.push(code.clone());
                continue;
            }
            modified.push(format!("{}-{}", code, MULTIPLE_PROCEDURE_MODIFIER));
            explanations.push(RuleExplanation::for_code(
                "R004",
                code.clone(),
                format!(
                    "Added modifier 51 to code {} as an additional procedure.",
                    code
                ),
            ));
        }
        (modified, explanations, true)
    }

    /// Coding tips for a code given the procedure description
    pub fn coding_tips(&self, procedure_text: &str, db: &CodeDatabase, code: &str) -> Vec<String> {
        let mut tips = vec![
            "Ensure the documentation supports medical necessity.".to_string(),
            "Check that the procedure description matches the code definition exactly."
                .to_string(),
        ];

        let text = procedure_text.to_lowercase();
        if text.contains("consultation") {
            tips.push(
                "Initial consultations may require different codes than follow-up visits."
                    .to_string(),
            );
        }
        if text.contains("biopsy") {
            tips.push("Verify if the biopsy was for diagnostic or therapeutic purposes.".to_string());
        }
        if text.contains("endoscopic") || text.contains("endoscopy") {
            tips.push("Endoscopic procedures often have specific bundling rules.".to_string());
        }

        if db.is_key_indicator(code) {
            tips.push(
                "This is a key indicator code and should be prioritized when applicable."
                    .to_string(),
            );
        }
        if db.standard_charge(code) > 0.0 {
            tips.push(
                "Consider the standard charge as an indicator of procedure complexity.".to_string(),
            );
        }

        tips
    }
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeDatabase;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEST_TABLE: &str = "\
cpt_code,description,category,subspecialty,related_codes,key_indicator,standard_charge
31231,\"Nasal endoscopy, diagnostic\",Nose,Rhinology,\"31233, 31235\",No,850.00
31233,Nasal endoscopy with maxillary sinusoscopy,Nose,Rhinology,31231,No,975.50
69436,\"Tympanostomy with tubes, general anesthesia\",Ear,Otology,69433,Yes,2150.00
42820,\"Tonsillectomy and adenoidectomy, under age 12\",Throat,,,No,1650.00
30520,Septoplasty,Nose,Rhinology,30930,No,1800.00
";

    fn test_db() -> CodeDatabase {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TEST_TABLE.as_bytes()).unwrap();
        CodeDatabase::load(file.path()).unwrap()
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let engine = RulesEngine::new();
        let priorities: Vec<i32> = engine.rules().iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);

        let ids: Vec<&str> = engine.rules().iter().map(|r| r.rule_id.as_str()).collect();
        assert!(ids.contains(&"R001"));
        assert!(ids.contains(&"R002"));
    }

    #[test]
    fn test_add_rule_resorts() {
        let mut engine = RulesEngine::new();
        let initial = engine.rules().len();
        engine.add_rule(CodeRule::new(
            "T001",
            "Test rule",
            RuleCondition::MedicalNecessity,
            200,
        ));
        assert_eq!(engine.rules().len(), initial + 1);
        assert_eq!(engine.rules()[0].rule_id, "T001");
    }

    #[test]
    fn test_analyze_rejects_empty_candidates() {
        let engine = RulesEngine::new();
        let db = test_db();
        let result = engine.analyze("septoplasty", &[], &db);
        assert!(matches!(result, Err(CptAgentError::NoCandidates)));
    }

    #[test]
    fn test_single_code_passes_through() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze("Diagnostic nasal endoscopy", &codes(&["31231"]), &db)
            .unwrap();
        assert_eq!(analysis.recommended_codes, vec!["31231"]);
        assert!(analysis.excluded_codes.is_empty());
        assert!(!analysis.bundled_codes);
    }

    #[test]
    fn test_bundled_pair_excludes_partner() {
        let engine = RulesEngine::new();
        let db = test_db();
        // 31233 has the higher charge so prioritization puts it first; its
        // related list contains 31231, which then gets excluded as bundled.
        let analysis = engine
            .analyze(
                "Nasal endoscopy with sinusoscopy",
                &codes(&["31231", "31233"]),
                &db,
            )
            .unwrap();
        assert_eq!(analysis.recommended_codes, vec!["31233"]);
        assert_eq!(analysis.excluded_codes, vec!["31231"]);
        assert!(analysis.bundled_codes);
        assert!(analysis
            .explanations
            .iter()
            .any(|e| e.rule_id == "R001" && e.message.contains("bundled")));
    }

    #[test]
    fn test_bilateral_adds_modifier_50() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze(
                "Bilateral tympanostomy with tubes",
                &codes(&["69436"]),
                &db,
            )
            .unwrap();
        assert!(analysis.bilateral);
        assert_eq!(analysis.recommended_codes, vec!["69436-50"]);
        assert!(analysis
            .explanations
            .iter()
            .any(|e| e.rule_id == "R002" && e.message.contains("modifier 50")));
    }

    #[test]
    fn test_unilateral_text_keeps_codes_unchanged() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze("Left tympanostomy with tube", &codes(&["69436"]), &db)
            .unwrap();
        assert!(!analysis.bilateral);
        assert_eq!(analysis.recommended_codes, vec!["69436"]);
    }

    #[test]
    fn test_post_op_visit_flagged() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze(
                "Post-op follow-up after tonsillectomy",
                &codes(&["42820"]),
                &db,
            )
            .unwrap();
        assert!(analysis
            .explanations
            .iter()
            .any(|e| e.rule_id == "R003" && e.message.contains("surgical package")));
        // Explanation only; the code is not dropped
        assert_eq!(analysis.recommended_codes, vec!["42820"]);
    }

    #[test]
    fn test_multiple_procedures_adds_modifier_51() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze(
                "Multiple procedures: septoplasty and tonsillectomy",
                &codes(&["30520", "42820"]),
                &db,
            )
            .unwrap();
        assert!(analysis.multiple_procedures);
        // 30520 wins prioritization on charge, the secondary gets -51
        assert_eq!(analysis.recommended_codes, vec!["30520", "42820-51"]);
    }

    #[test]
    fn test_prioritization_puts_key_indicator_first() {
        let engine = RulesEngine::new();
        let db = test_db();
        // 69436 is the key indicator; 30520's charge is irrelevant next to it
        let analysis = engine
            .analyze(
                "Tube placement versus septoplasty",
                &codes(&["30520", "69436"]),
                &db,
            )
            .unwrap();
        assert_eq!(analysis.recommended_codes[0], "69436");
        assert!(analysis
            .explanations
            .iter()
            .any(|e| e.rule_id == "R000" && e.message.contains("key indicator")));
    }

    #[test]
    fn test_unknown_codes_are_dropped() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze("Septoplasty", &codes(&["30520", "99999"]), &db)
            .unwrap();
        assert_eq!(analysis.recommended_codes, vec!["30520"]);
    }

    #[test]
    fn test_medical_necessity_reminder_always_present() {
        let engine = RulesEngine::new();
        let db = test_db();
        let analysis = engine
            .analyze("Septoplasty", &codes(&["30520"]), &db)
            .unwrap();
        assert!(analysis.explanations.iter().any(|e| e.rule_id == "R005"));
    }

    #[test]
    fn test_coding_tips() {
        let engine = RulesEngine::new();
        let db = test_db();
        let tips = engine.coding_tips("Diagnostic nasal endoscopy with biopsy", &db, "69436");
        assert!(tips.iter().any(|t| t.contains("biopsy")));
        assert!(tips.iter().any(|t| t.contains("bundling rules")));
        assert!(tips.iter().any(|t| t.contains("key indicator")));
    }

    #[test]
    fn test_rule_explanations_map() {
        let engine = RulesEngine::new();
        let map = engine.rule_explanations();
        assert_eq!(map.len(), 6);
        assert!(map["R002"].contains("bilateral"));
    }
}
