//! Configuration management for cptd.
//!
//! Loads settings from a TOML file or falls back to defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default config file path
pub const CONFIG_PATH: &str = "config.toml";

/// LLM backend configuration (OpenAI-compatible local server, LM Studio style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model to request from the backend
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; coding answers want determinism
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; local servers accept any placeholder
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "qwen2.5-14b-instruct".to_string()
}

fn default_temperature() -> f64 {
    0.0
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_base_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_api_key() -> String {
    "lm-studio".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
            api_key: default_api_key(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Code table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the spreadsheet-derived CSV of ENT CPT codes
    #[serde(default = "default_database_path")]
    pub file_path: String,
}

fn default_database_path() -> String {
    "data/ent_cpt_codes.csv".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file_path: default_database_path(),
        }
    }
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory for persisted conversation sessions
    #[serde(default = "default_conversation_dir")]
    pub conversation_dir: String,

    /// Candidate codes retrieved per query
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Default result cap for substring search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_conversation_dir() -> String {
    cpt_shared::DEFAULT_CONVERSATION_DIR.to_string()
}

fn default_candidate_limit() -> usize {
    15
}

fn default_search_limit() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            conversation_dir: default_conversation_dir(),
            candidate_limit: default_candidate_limit(),
            search_limit: default_search_limit(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load config from the given path, or return defaults
    pub fn load(path: &str) -> Self {
        Self::load_from_path(path).unwrap_or_else(|e| {
            warn!("Config not found at {}, using defaults: {}", path, e);
            Config::default()
        })
    }

    fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Save a default config to path (for init)
    pub fn save_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)?;
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.model, "qwen2.5-14b-instruct");
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.llm.base_url, "http://localhost:1234/v1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.agent.candidate_limit, 15);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[llm]
model = "custom-7b"
max_tokens = 2048

[server]
port = 9001
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.llm.model, "custom-7b");
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.server.port, 9001);
        // Defaults for missing fields
        assert_eq!(config.llm.temperature, 0.0);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.file_path, "data/ent_cpt_codes.csv");
    }

    #[test]
    fn test_empty_section_falls_back_to_defaults() {
        let toml_str = r#"
[agent]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.conversation_dir, "conversations");
        assert_eq!(config.agent.search_limit, 10);
    }
}
