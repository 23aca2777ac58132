//! Provider traits: the abstraction over generation models and query engines.
//!
//! A [`GenerationModelProvider`] turns a (system, user) prompt pair into text
//! and metered usage. A [`QueryEngineProvider`] validates, executes and
//! describes queries against a data source. Query text is opaque to the
//! engine crate; only the provider understands its language.
//!
//! Implementations own every outbound network call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::ConnectionInfo;
use crate::error::{Error, GenerationError, QueryEngineError};
use crate::output::{self, OutputShape};
use crate::usage::{NanoUsd, UsageAccount};

/// A completed generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: UsageAccount,
}

/// Describes one settings key a provider understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingSpec {
    pub key: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// The generation-model capability set.
#[async_trait]
pub trait GenerationModelProvider: Send + Sync {
    /// A human-readable name (e.g., "openai", "gemini").
    fn name(&self) -> &str;

    /// Fails with [`Error::InvalidProviderSettings`] when credentials or the
    /// model identifier are missing.
    fn validate_settings(&self) -> Result<(), Error>;

    /// Send one prompt pair and return the text and metered usage.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Generation, GenerationError>;

    /// Strip fencing/format markers for the declared shape.
    fn extract_structured_output(&self, text: &str, shape: OutputShape) -> String {
        output::extract(text, shape)
    }

    /// Price a call of the given size.
    fn cost(&self, input_tokens: u64, output_tokens: u64) -> NanoUsd;

    /// Embed text. `Ok(None)` means this provider has no embedding model.
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, GenerationError> {
        Ok(None)
    }
}

/// Proof of a successful connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
}

/// The outcome of validating a query. A rejected query is an expected
/// result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    pub reason: String,
}

impl Validation {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// The query-engine capability set.
#[async_trait]
pub trait QueryEngineProvider: Send + Sync {
    /// The engine kind (e.g., "elasticsearch", "postgres").
    fn name(&self) -> &str;

    /// What the generation model must produce for this engine.
    fn output_shape(&self) -> OutputShape;

    async fn connect(&self, conn: &ConnectionInfo) -> Result<ConnectionHandle, QueryEngineError>;

    async fn test_connection(&self, conn: &ConnectionInfo) -> bool {
        self.connect(conn).await.is_ok()
    }

    /// Check a query without running it. Only an unreachable engine is an `Err`.
    ///
    /// `dataset_refs` names the tables/indices the query targets.
    async fn validate_query(
        &self,
        conn: &ConnectionInfo,
        dataset_refs: &[String],
        query: &str,
    ) -> Result<Validation, QueryEngineError>;

    /// Run a validated query. Any failure other than an unreachable engine
    /// is `QueryEngineError::Execution`.
    async fn execute(
        &self,
        conn: &ConnectionInfo,
        dataset_refs: &[String],
        query: &str,
    ) -> Result<serde_json::Value, QueryEngineError>;

    /// Schema text for the given tables/indices, or `None` if the engine
    /// knows nothing about them.
    async fn describe_schema(
        &self,
        dataset_refs: &[String],
        conn: &ConnectionInfo,
    ) -> Result<Option<String>, QueryEngineError>;

    /// Lower any result-size field in `query` to at most `max_rows`. Never
    /// raises it. `Err` carries a reason when the query cannot be parsed.
    fn clamp_result_size(&self, query: &str, max_rows: u64) -> Result<String, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoModel;

    #[async_trait]
    impl GenerationModelProvider for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn validate_settings(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn generate(&self, _system: &str, user: &str) -> Result<Generation, GenerationError> {
            Ok(Generation {
                text: format!("```sql\n{user};\n```"),
                usage: UsageAccount::zero(),
            })
        }

        fn cost(&self, _input: u64, _output: u64) -> NanoUsd {
            NanoUsd::ZERO
        }
    }

    #[tokio::test]
    async fn default_extraction_and_embedding() {
        let model = EchoModel;
        let out = model.generate("", "SELECT 1").await.unwrap();
        assert_eq!(model.extract_structured_output(&out.text, OutputShape::Sql), "SELECT 1");
        assert_eq!(model.embed("hello").await.unwrap(), None);
    }

    #[test]
    fn validation_constructors() {
        assert!(Validation::accepted().valid);
        let rejected = Validation::rejected("unknown field `spend`");
        assert!(!rejected.valid);
        assert_eq!(rejected.reason, "unknown field `spend`");
    }
}
