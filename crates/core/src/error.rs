//! Error types for the querysmith domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the
//! workflow-level error that callers of the engine see.

use thiserror::Error;

/// The top-level error type for all querysmith operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Generation model error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Query engine error: {0}")]
    QueryEngine(#[from] QueryEngineError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Registry / configuration-time errors ---
    #[error("Unsupported provider kind: {kind}")]
    UnsupportedProvider { kind: String },

    #[error("Invalid provider settings: {0}")]
    InvalidProviderSettings(String),

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Workflow errors ---
    #[error("Query generation failed after {attempts} attempt(s): {}", errors.join(" | "))]
    QueryGenerationExhausted { attempts: u32, errors: Vec<String> },

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Workflow deadline of {secs}s exceeded")]
    DeadlineExceeded { secs: u64 },

    // --- Request errors ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} is disabled: {name}")]
    Disabled { kind: &'static str, name: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this failure came from an unreachable upstream (model or engine).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Error::Generation(GenerationError::Connection(_))
                | Error::QueryEngine(QueryEngineError::Connection(_))
        )
    }

    /// The message an API layer should show to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Generation(GenerationError::ContentPolicy(_)) => {
                "The question was flagged by the model's content policy. Please rephrase it.".into()
            }
            Error::Generation(GenerationError::ContextOverflow(_)) => {
                "The question needs more context than the model can accept. Try a narrower question.".into()
            }
            Error::Generation(GenerationError::Connection(_)) => {
                "The language model service is unreachable right now.".into()
            }
            Error::Generation(GenerationError::Upstream { .. }) => {
                "The language model service returned an error.".into()
            }
            Error::QueryEngine(QueryEngineError::Connection(_)) => {
                "The data source is unreachable right now.".into()
            }
            Error::QueryEngine(QueryEngineError::Execution(_)) => {
                "The generated query could not be executed against the data source.".into()
            }
            Error::QueryGenerationExhausted { .. } => {
                "A valid query could not be generated for this question. Please rephrase it.".into()
            }
            Error::Cancelled | Error::DeadlineExceeded { .. } => {
                "The request took too long and was cancelled.".into()
            }
            Error::InvalidRequest(msg) => msg.clone(),
            Error::NotFound { kind, name } => format!("{kind} '{name}' does not exist."),
            Error::Disabled { kind, name } => format!("{kind} '{name}' is disabled."),
            _ => "The request could not be processed.".into(),
        }
    }
}

// --- Bounded context errors ---

/// Failures raised by a generation-model provider.
///
/// None of these are retried by the generation loop.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Request rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("Context window exceeded: {0}")]
    ContextOverflow(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Upstream error (status {status_code}): {message}")]
    Upstream { status_code: u16, message: String },

    #[error("Embeddings not supported by {0}")]
    EmbeddingsUnsupported(String),
}

/// Failures raised by a query-engine provider.
#[derive(Debug, Clone, Error)]
pub enum QueryEngineError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Invalid connection settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Per-macro resolution failures. Logged and dropped by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("Undefined macro: {0}")]
    Undefined(String),

    #[error("No value available for macro: {0}")]
    Unavailable(String),
}
