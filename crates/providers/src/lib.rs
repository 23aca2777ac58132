//! Provider implementations for querysmith.
//!
//! Generation models implement `querysmith_core::GenerationModelProvider`;
//! query engines implement `querysmith_core::QueryEngineProvider`. The
//! registry maps a configured kind string to one of them.

pub mod elasticsearch;
pub mod gemini;
pub mod openai;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod pricing;
pub mod registry;
mod upstream;

pub use elasticsearch::ElasticsearchProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;
pub use pricing::ModelPricing;
pub use registry::{GenerationModelKind, QueryEngineKind, llm_provider, query_engine_provider};
