//! Agent orchestrator.
//!
//! Wires the code database, rules engine, and LLM client into the query
//! pipeline: translate the query into coding terminology, retrieve candidate
//! codes, ask the model for recommendations grounded in those candidates,
//! then post-process the suggested codes through the rules engine.

use crate::codes::CodeDatabase;
use crate::config::Config;
use crate::llm::{ChatMessage, LlmClient};
use crate::prompts;
use crate::rules::RulesEngine;
use anyhow::{Context, Result};
use cpt_shared::api::HealthResponse;
use cpt_shared::conversation::{Conversation, Role};
use cpt_shared::{base_code, extract_codes, CptAgentError, ProcedureAnalysis};
use tracing::{error, info, warn};

/// Result of one query turn
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub codes: Vec<String>,
    pub analysis: Option<ProcedureAnalysis>,
}

/// The ENT CPT coding agent
pub struct CptAgent {
    config: Config,
    db: CodeDatabase,
    rules: RulesEngine,
    llm: LlmClient,
}

impl CptAgent {
    pub fn new(config: Config) -> Result<Self> {
        let db = CodeDatabase::load(&config.database.file_path)
            .context("Failed to load CPT code database")?;
        let llm = LlmClient::new(&config.llm)?;
        Ok(Self {
            config,
            db,
            rules: RulesEngine::new(),
            llm,
        })
    }

    pub fn database(&self) -> &CodeDatabase {
        &self.db
    }

    pub fn rules(&self) -> &RulesEngine {
        &self.rules
    }

    pub async fn llm_available(&self) -> bool {
        self.llm.is_available().await
    }

    /// Process one user query within a conversation.
    ///
    /// LLM failures never bubble out of here: the original behavior is to
    /// answer with an apology and keep the session usable.
    pub async fn process_query(&self, query: &str, conversation: &mut Conversation) -> QueryOutcome {
        info!("Processing query: {}", query);
        conversation.add_message(Role::User, query, Vec::new());

        // Step 1: translate the query into coding terminology. Fall back to
        // the raw query when the model is unavailable.
        let search_terms = match self
            .llm
            .chat(&[ChatMessage::user(prompts::translate_prompt(query))])
            .await
        {
            Ok(terms) if !terms.trim().is_empty() => terms,
            Ok(_) => {
                warn!("Translator returned empty terms, using raw query");
                query.to_string()
            }
            Err(e) => {
                warn!("Translator failed ({}), using raw query", e);
                query.to_string()
            }
        };

        // Step 2: retrieve candidate codes for grounding
        let candidates = self
            .db
            .search_ranked(&search_terms, self.config.agent.candidate_limit);
        info!(
            "Retrieved {} candidate codes for terms: {}",
            candidates.len(),
            search_terms
        );

        // Step 3: ask the model, with the conversation history attached
        let mut messages = vec![ChatMessage::system(prompts::system_prompt(&candidates))];
        for message in &conversation.messages {
            match message.role {
                Role::User => messages.push(ChatMessage::user(message.content.clone())),
                Role::Assistant => messages.push(ChatMessage::assistant(message.content.clone())),
                Role::System => {}
            }
        }

        match self.llm.chat(&messages).await {
            Ok(answer) => {
                let codes = extract_codes(&answer);
                let analysis = self.analyze_extracted(query, &codes);
                conversation.add_message(Role::Assistant, answer.clone(), codes.clone());
                QueryOutcome {
                    answer,
                    codes,
                    analysis,
                }
            }
            Err(e) => {
                error!("LLM request failed: {}", e);
                let answer = format!(
                    "I apologize, but I encountered an error while processing your query: {}",
                    e
                );
                conversation.add_message(Role::Assistant, answer.clone(), Vec::new());
                QueryOutcome {
                    answer,
                    codes: Vec::new(),
                    analysis: None,
                }
            }
        }
    }

    /// Run the rules engine over codes extracted from an answer
    fn analyze_extracted(&self, query: &str, codes: &[String]) -> Option<ProcedureAnalysis> {
        if codes.is_empty() {
            return None;
        }
        let base_codes: Vec<String> = codes.iter().map(|c| base_code(c).to_string()).collect();
        match self.rules.analyze(query, &base_codes, &self.db) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("Rules analysis failed: {}", e);
                None
            }
        }
    }

    /// Rules-engine analysis of a procedure description. Candidates are
    /// searched from the description when not supplied.
    pub fn analyze_procedure(
        &self,
        procedure_text: &str,
        candidate_codes: Option<Vec<String>>,
    ) -> Result<ProcedureAnalysis, CptAgentError> {
        let candidates = match candidate_codes {
            Some(codes) if !codes.is_empty() => codes,
            _ => self
                .db
                .search(procedure_text, self.config.agent.search_limit)
                .into_iter()
                .map(|d| d.code)
                .collect(),
        };
        self.rules.analyze(procedure_text, &candidates, &self.db)
    }

    pub async fn health(&self, uptime_seconds: u64) -> HealthResponse {
        let stats = self.db.stats();
        let llm_available = self.llm.is_available().await;
        HealthResponse {
            status: if llm_available { "healthy" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            model: self.llm.model().to_string(),
            llm_available,
            database: self.db.path().display().to_string(),
            codes_loaded: stats.codes_loaded,
            key_indicators_loaded: stats.key_indicators_loaded,
            standard_charges_loaded: stats.standard_charges_loaded,
            conversation_dir: self.config.agent.conversation_dir.clone(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
