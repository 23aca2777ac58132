//! Configuration loading, validation, and management for querysmith.
//!
//! Loads configuration from `~/.querysmith/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod prompts;

pub use prompts::PromptTemplates;

/// The root configuration structure.
///
/// Maps directly to `~/.querysmith/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key used for any model whose settings leave `api_key` blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Generation and retrieval tuning
    #[serde(default)]
    pub engine: EngineSettings,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptTemplates,

    /// Where configuration, history and analytics are stored
    #[serde(default)]
    pub storage: StorageConfig,

    /// Scheduled cleanup of old conversations
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Background embedding computation
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Datasets, connections and models declared in the file
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("engine", &self.engine)
            .field("prompts", &self.prompts)
            .field("storage", &self.storage)
            .field("retention", &self.retention)
            .field("embeddings", &self.embeddings)
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// How examples and feedback turns are ranked against a question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// Token-set text similarity
    #[default]
    Lexical,
    /// Cosine similarity of stored embeddings
    Embedding,
}

impl std::str::FromStr for RankingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" | "similarity_search" | "similaritysearch" => Ok(Self::Lexical),
            "embedding" | "vector_embedding" | "vectorembedding" => Ok(Self::Embedding),
            other => Err(ConfigError::ValidationError(format!(
                "unknown ranking strategy '{other}' (expected 'lexical' or 'embedding')"
            ))),
        }
    }
}

/// Immutable engine settings, injected into the orchestrator at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Row count the model is told to use when the question names none
    #[serde(default = "default_row_count")]
    pub default_row_count: u64,

    /// Upper bound enforced on every generated query
    #[serde(default = "default_max_row_count")]
    pub max_row_count: u64,

    /// Messages of session history included in the user prompt
    #[serde(default = "default_history_length")]
    pub history_length: usize,

    #[serde(default = "default_top_k")]
    pub example_top_k: usize,

    /// 0-100; permissive so loosely related examples still help
    #[serde(default = "default_example_min_score")]
    pub example_min_score: f64,

    #[serde(default = "default_top_k")]
    pub feedback_top_k: usize,

    /// 0-100; strict since feedback answers are reused verbatim
    #[serde(default = "default_feedback_min_score")]
    pub feedback_min_score: f64,

    /// Generate/validate cycles per question, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub ranking: RankingStrategy,

    /// Deadline for one whole question, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Directory of static schema overrides (`<dataset_id>.txt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_dir: Option<PathBuf>,
}

fn default_row_count() -> u64 {
    10
}
fn default_max_row_count() -> u64 {
    100
}
fn default_history_length() -> usize {
    6
}
fn default_top_k() -> usize {
    5
}
fn default_example_min_score() -> f64 {
    40.0
}
fn default_feedback_min_score() -> f64 {
    80.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_row_count: default_row_count(),
            max_row_count: default_max_row_count(),
            history_length: default_history_length(),
            example_top_k: default_top_k(),
            example_min_score: default_example_min_score(),
            feedback_top_k: default_top_k(),
            feedback_min_score: default_feedback_min_score(),
            max_attempts: default_max_attempts(),
            ranking: RankingStrategy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            schema_dir: None,
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite URL, e.g. `sqlite:///home/me/.querysmith/querysmith.db`
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("querysmith.db").display()
    )
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

/// Retention cleanup of historical chat messages and analytics rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (minute hour day month weekday)
    #[serde(default = "default_retention_schedule")]
    pub schedule: String,

    /// Records older than this many days are deleted
    #[serde(default = "default_keep_days")]
    pub keep_days: u32,

    /// Overlapping runs allowed at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_retention_schedule() -> String {
    "0 3 * * *".into()
}
fn default_keep_days() -> u32 {
    30
}
fn default_max_concurrent() -> usize {
    1
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_retention_schedule(),
            keep_days: default_keep_days(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Background embedding queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Jobs buffered before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Enqueue examples lacking an embedding when the daemon starts
    #[serde(default = "default_true")]
    pub backfill_on_start: bool,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            backfill_on_start: true,
        }
    }
}

/// Datasets, connections and models declared in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,

    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,

    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// A query-engine connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub name: String,
    /// `elasticsearch` or `postgres`
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("active", &self.active)
            .finish()
    }
}

/// A dataset and its worked examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub name: String,
    /// Name of a `[[catalog.connections]]` entry
    pub connection: String,
    /// Tables or indices, e.g. `["orders", "customers"]`
    pub refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_rules: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub examples: Vec<ExampleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleEntry {
    pub question: String,
    pub query: String,
    /// `core` or `semantic`
    #[serde(default = "default_example_category")]
    pub category: String,
}

fn default_example_category() -> String {
    "semantic".into()
}

/// A generation model.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// `openai`, `azure_openai` or `gemini`
    pub kind: String,
    #[serde(default)]
    pub settings: HashMap<String, String>,
    /// The first active model answers questions
    #[serde(default = "default_true")]
    pub active: bool,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&String> = self.settings.keys().collect();
        f.debug_struct("ModelEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("settings", &keys)
            .field("active", &self.active)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.querysmith/config.toml).
    ///
    /// Also checks environment variables:
    /// - `QUERYSMITH_API_KEY` / `OPENAI_API_KEY` for the shared API key
    /// - `QUERYSMITH_RANKING` (or `SENTENCE_MATCH_ENGINE`) for the ranking strategy
    /// - `QUERYSMITH_DATABASE_URL` for the storage URL
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply the environment overrides listed on [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = std::env::var("QUERYSMITH_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Some(key) = &self.api_key {
            for model in &mut self.catalog.models {
                let blank = model.settings.get("api_key").is_none_or(|k| k.trim().is_empty());
                if blank {
                    model.settings.insert("api_key".into(), key.clone());
                }
            }
        }

        let ranking = std::env::var("QUERYSMITH_RANKING")
            .ok()
            .or_else(|| std::env::var("SENTENCE_MATCH_ENGINE").ok());
        if let Some(raw) = ranking {
            self.engine.ranking = raw.parse()?;
        }

        if let Ok(url) = std::env::var("QUERYSMITH_DATABASE_URL") {
            self.storage.database_url = url;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".querysmith")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_attempts must be at least 1".into(),
            ));
        }
        if engine.max_row_count == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_row_count must be > 0".into(),
            ));
        }
        if engine.default_row_count > engine.max_row_count {
            return Err(ConfigError::ValidationError(format!(
                "engine.default_row_count ({}) exceeds engine.max_row_count ({})",
                engine.default_row_count, engine.max_row_count
            )));
        }
        for (name, score) in [
            ("example_min_score", engine.example_min_score),
            ("feedback_min_score", engine.feedback_min_score),
        ] {
            if !(0.0..=100.0).contains(&score) {
                return Err(ConfigError::ValidationError(format!(
                    "engine.{name} must be between 0 and 100"
                )));
            }
        }

        validate_cron(&self.retention.schedule)?;
        if self.retention.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "retention.max_concurrent must be at least 1".into(),
            ));
        }

        let connections: Vec<&str> = self.catalog.connections.iter().map(|c| c.name.as_str()).collect();
        for dataset in &self.catalog.datasets {
            if !connections.contains(&dataset.connection.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "dataset '{}' refers to unknown connection '{}'",
                    dataset.name, dataset.connection
                )));
            }
            if dataset.refs.iter().all(|r| r.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "dataset '{}' must name at least one table or index",
                    dataset.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            engine: EngineSettings::default(),
            prompts: PromptTemplates::default(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            embeddings: EmbeddingConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

/// Structural check of a 5-field cron expression. The scheduler does the
/// full parse; this catches typos at load time.
fn validate_cron(expr: &str) -> Result<(), ConfigError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let well_formed = fields.len() == 5
        && fields.iter().all(|f| {
            f.chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '*' | '/' | ',' | '-'))
        });
    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "retention.schedule '{expr}' is not a 5-field cron expression"
        )))
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for querysmith_core::Error {
    fn from(e: ConfigError) -> Self {
        querysmith_core::Error::Config {
            message: e.to_string(),
        }
    }
}
