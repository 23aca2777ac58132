//! Conversation types: sessions, chat messages and per-turn analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::UsageAccount;

/// Groups a sequence of question/answer turns for history retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh server-side session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Use a caller-supplied id. Blank ids are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Human,
    Ai,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Ai => "AI",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            other => Err(format!("unknown chat role '{other}'")),
        }
    }
}

/// One message in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: SessionId,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn human(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: ChatRole::Human,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn ai(session_id: SessionId, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: ChatRole::Ai,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Render history as `Human: ...` / `AI: ...` lines, oldest first.
pub fn format_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The analytics row written once per answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Assigned by the store on append.
    pub id: i64,
    pub dataset_id: i64,
    pub model_id: i64,
    pub session_id: SessionId,
    pub question: String,
    pub answer: String,
    pub query: String,
    pub usage: UsageAccount,
    /// Reviewer verdict, unset until someone reviews the answer.
    pub correct: Option<bool>,
    pub cached: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_embedding: Option<Vec<f32>>,
}
