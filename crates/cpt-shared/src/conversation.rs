//! Conversation sessions and the file-backed session store.
//!
//! One JSON file per session under the conversation directory. Corrupt files
//! are quarantined with a `.corrupted` suffix rather than aborting the load.

use crate::error::CptAgentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Message role within a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A single message in a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// CPT codes identified in this message, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<String>,
}

/// Running totals stored alongside the messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub total_messages: usize,
    pub total_codes_identified: usize,
}

/// A conversation session with the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub metadata: ConversationMetadata,
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let start_time = Utc::now();
        Self {
            metadata: ConversationMetadata {
                session_id: session_id.clone(),
                start_time,
                total_messages: 0,
                total_codes_identified: 0,
            },
            session_id,
            messages: Vec::new(),
        }
    }

    /// Append a message, updating the running totals
    pub fn add_message(&mut self, role: Role, content: impl Into<String>, codes: Vec<String>) {
        self.metadata.total_codes_identified += codes.len();
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            codes,
        });
        self.metadata.total_messages = self.messages.len();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            start_time: self.metadata.start_time,
            total_messages: self.metadata.total_messages,
            total_codes_identified: self.metadata.total_codes_identified,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata summary used by session listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub total_messages: usize,
    pub total_codes_identified: usize,
}

/// File-backed store, one `<session_id>.json` per conversation
pub struct ConversationStore {
    dir: PathBuf,
    conversations: HashMap<String, Conversation>,
}

impl ConversationStore {
    /// Open the store, creating the directory if needed and loading every
    /// existing session. Corrupt files are renamed aside and skipped.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CptAgentError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut conversations = HashMap::new();
        let mut skipped = 0usize;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Warning: cannot read session file {:?}: {}", path, e);
                    skipped += 1;
                    continue;
                }
            };

            match serde_json::from_str::<Conversation>(&content) {
                Ok(conversation) => {
                    conversations.insert(conversation.session_id.clone(), conversation);
                }
                Err(e) => {
                    eprintln!("Warning: skipping corrupt session file {:?}: {}", path, e);
                    let backup = path.with_extension("json.corrupted");
                    if let Err(rename_err) = fs::rename(&path, &backup) {
                        eprintln!("Warning: failed to quarantine {:?}: {}", path, rename_err);
                    }
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            eprintln!("Warning: {} session file(s) were corrupt or unreadable", skipped);
        }

        Ok(Self { dir, conversations })
    }

    /// Create a new session and persist it immediately
    pub fn create(&mut self) -> Result<Conversation, CptAgentError> {
        let conversation = Conversation::new();
        self.save(&conversation)?;
        Ok(conversation)
    }

    pub fn get(&self, session_id: &str) -> Option<&Conversation> {
        self.conversations.get(session_id)
    }

    /// Persist a conversation (insert or update)
    pub fn save(&mut self, conversation: &Conversation) -> Result<(), CptAgentError> {
        let json = serde_json::to_string_pretty(conversation)?;
        fs::write(self.session_path(&conversation.session_id), json)?;
        self.conversations
            .insert(conversation.session_id.clone(), conversation.clone());
        Ok(())
    }

    /// Remove a session from memory and disk. Returns false if unknown.
    pub fn delete(&mut self, session_id: &str) -> Result<bool, CptAgentError> {
        if self.conversations.remove(session_id).is_none() {
            return Ok(false);
        }
        let path = self.session_path(session_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    /// Session summaries, newest first
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.conversations.values().map(|c| c.summary()).collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        summaries
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}
