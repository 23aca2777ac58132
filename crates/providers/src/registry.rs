//! Provider registry: resolves a logical kind to a concrete provider.
//!
//! The set of kinds is closed. Lookups go through the two enums below, so
//! adding a backend means adding a variant and a match arm.

use std::collections::HashMap;
use std::sync::Arc;

use querysmith_core::provider::{GenerationModelProvider, QueryEngineProvider, SettingSpec};
use querysmith_core::Error;

use crate::elasticsearch::ElasticsearchProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
#[cfg(feature = "postgres")]
use crate::postgres::PostgresProvider;

/// Supported generation-model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationModelKind {
    OpenAi,
    AzureOpenAi,
    Gemini,
}

impl GenerationModelKind {
    pub const ALL: [GenerationModelKind; 3] = [Self::OpenAi, Self::AzureOpenAi, Self::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Gemini => "gemini",
        }
    }

    /// Settings keys this backend understands.
    pub fn settings_template(&self) -> Vec<SettingSpec> {
        match self {
            Self::OpenAi => OpenAiProvider::openai_settings(),
            Self::AzureOpenAi => OpenAiProvider::azure_settings(),
            Self::Gemini => GeminiProvider::settings_template(),
        }
    }
}

impl std::str::FromStr for GenerationModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" | "azureopenai" => Ok(Self::AzureOpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(Error::UnsupportedProvider { kind: s.to_string() }),
        }
    }
}

/// Supported query-engine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryEngineKind {
    Elasticsearch,
    Postgres,
}

impl QueryEngineKind {
    pub const ALL: [QueryEngineKind; 2] = [Self::Elasticsearch, Self::Postgres];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elasticsearch => "elasticsearch",
            Self::Postgres => "postgres",
        }
    }
}

impl std::str::FromStr for QueryEngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" | "elastic" => Ok(Self::Elasticsearch),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(Error::UnsupportedProvider { kind: s.to_string() }),
        }
    }
}

/// Build a generation-model provider. Settings are not validated here; call
/// `validate_settings()` on the result.
pub fn llm_provider(
    kind: &str,
    settings: &HashMap<String, String>,
) -> Result<Arc<dyn GenerationModelProvider>, Error> {
    let provider: Arc<dyn GenerationModelProvider> = match kind.parse::<GenerationModelKind>()? {
        GenerationModelKind::OpenAi => Arc::new(OpenAiProvider::openai(settings)),
        GenerationModelKind::AzureOpenAi => Arc::new(OpenAiProvider::azure(settings)),
        GenerationModelKind::Gemini => Arc::new(GeminiProvider::new(settings)),
    };
    Ok(provider)
}

/// Build a query-engine provider.
pub fn query_engine_provider(kind: &str) -> Result<Arc<dyn QueryEngineProvider>, Error> {
    match kind.parse::<QueryEngineKind>()? {
        QueryEngineKind::Elasticsearch => Ok(Arc::new(ElasticsearchProvider::new())),
        #[cfg(feature = "postgres")]
        QueryEngineKind::Postgres => Ok(Arc::new(PostgresProvider::new())),
        #[cfg(not(feature = "postgres"))]
        QueryEngineKind::Postgres => Err(Error::UnsupportedProvider {
            kind: format!("{kind} (built without the `postgres` feature)"),
        }),
    }
}
