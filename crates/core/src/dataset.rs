//! Dataset configuration: what a question is asked against.
//!
//! A dataset names one or more tables/indices on a connection, carries
//! optional prompt overrides and business rules, and owns the worked
//! examples used as few-shot context.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an example participates in prompt assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleCategory {
    /// Always included, in stored order.
    Core,
    /// Included only when relevant to the current question.
    Semantic,
}

impl ExampleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Semantic => "semantic",
        }
    }
}

impl std::str::FromStr for ExampleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(Self::Core),
            "semantic" => Ok(Self::Semantic),
            other => Err(format!("unknown example category '{other}'")),
        }
    }
}

/// A worked (question, query) example owned by a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: i64,
    /// The natural-language question.
    pub key: String,
    /// The reference answer (usually a query).
    pub value: String,
    pub category: ExampleCategory,
    /// Computed in the background after authoring; absent until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A prior exchange a human reviewer marked as correct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackTurn {
    pub id: i64,
    pub question: String,
    /// The accepted query for that question.
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A named dataset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub id: i64,
    pub name: String,
    pub connection_id: i64,
    /// Tables or indices the questions are answered from.
    pub dataset_refs: Vec<String>,
    /// Replaces the default query-generation prompt when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_rules: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Connection details for a query engine.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: i64,
    pub name: String,
    /// Query-engine kind, e.g. `elasticsearch` or `postgres`.
    pub kind: String,
    /// Base URL or connection string.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// A configured generation model.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: i64,
    pub name: String,
    /// Generation-model kind, e.g. `openai`, `azure_openai` or `gemini`.
    pub kind: String,
    /// Provider settings (`api_key`, `model`, `endpoint`, ...).
    #[serde(default)]
    pub settings: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ModelConfig {
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings: HashMap<&str, &str> = self
            .settings
            .iter()
            .map(|(k, v)| {
                let shown = if k.contains("key") || k.contains("secret") {
                    "[REDACTED]"
                } else {
                    v.as_str()
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("ModelConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("settings", &settings)
            .field("is_active", &self.is_active)
            .finish()
    }
}
