//! The generate-validate-retry loop.
//!
//! ```text
//! METADATA_READY -> GENERATE -> VALIDATE -> SUCCESS
//!                      ^            |
//!                      +-- RETRY <--+--> EXHAUSTED
//! ```
//!
//! Every attempt rebuilds the system prompt with the reasons all earlier
//! attempts failed. Provider errors are terminal and skip `RETRY`.

use querysmith_core::{
    ConnectionInfo, Error, GenerationModelProvider, QueryEngineProvider, Result, UsageAccount,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ContextSections;
use crate::macros::MacroContext;
use crate::prompt::PromptBuilder;

const NO_QUERY_REASON: &str = "The response did not contain a query.";
const REJECTED_REASON: &str = "The query failed validation.";

/// Everything one invocation of the loop needs.
pub struct GenerationRequest<'a> {
    /// Custom prompt or the engine's default template.
    pub base_prompt: &'a str,
    pub business_rules: Option<&'a str>,
    pub sections: &'a ContextSections,
    pub macros: &'a MacroContext<'a>,
    /// The fully rendered user prompt.
    pub user_prompt: &'a str,
    pub connection: &'a ConnectionInfo,
    pub dataset_refs: &'a [String],
}

/// One generate+validate cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationAttempt {
    /// 1-based.
    pub index: u32,
    /// Empty when nothing could be extracted.
    pub query: String,
    pub valid: bool,
    pub reason: String,
}

/// A validated query and what it took to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub query: String,
    pub usage: UsageAccount,
    pub attempts: Vec<GenerationAttempt>,
}

/// Bounded retry of query generation with error feedback.
#[derive(Debug, Clone)]
pub struct GenerationLoop {
    prompts: PromptBuilder,
    max_attempts: u32,
    max_row_count: u64,
}

impl GenerationLoop {
    pub fn new(prompts: PromptBuilder, max_attempts: u32, max_row_count: u64) -> Self {
        Self {
            prompts,
            max_attempts: max_attempts.max(1),
            max_row_count,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run(
        &self,
        request: &GenerationRequest<'_>,
        llm: &dyn GenerationModelProvider,
        engine: &dyn QueryEngineProvider,
        cancel: &CancellationToken,
    ) -> Result<GeneratedQuery> {
        let mut usage = UsageAccount::zero();
        let mut errors: Vec<String> = Vec::new();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();

        for index in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let system_prompt = self.prompts.system_prompt(
                request.base_prompt,
                request.business_rules,
                request.sections,
                request.macros,
                &errors,
            )?;

            debug!(attempt = index, provider = %llm.name(), "Generating query");
            let generation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = llm.generate(&system_prompt, request.user_prompt) => result?,
            };
            usage += generation.usage;

            let extracted = llm.extract_structured_output(&generation.text, engine.output_shape());
            if extracted.trim().is_empty() {
                warn!(attempt = index, "No query in model response");
                errors.push(NO_QUERY_REASON.to_string());
                attempts.push(GenerationAttempt {
                    index,
                    query: String::new(),
                    valid: false,
                    reason: NO_QUERY_REASON.to_string(),
                });
                continue;
            }

            let query = match engine.clamp_result_size(&extracted, self.max_row_count) {
                Ok(query) => query,
                Err(reason) => {
                    warn!(attempt = index, %reason, "Generated query could not be parsed");
                    errors.push(reason.clone());
                    attempts.push(GenerationAttempt {
                        index,
                        query: extracted,
                        valid: false,
                        reason,
                    });
                    continue;
                }
            };

            let verdict = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = engine.validate_query(request.connection, request.dataset_refs, &query) => result?,
            };

            if verdict.valid {
                info!(attempt = index, engine = %engine.name(), "Query validated");
                attempts.push(GenerationAttempt {
                    index,
                    query: query.clone(),
                    valid: true,
                    reason: String::new(),
                });
                return Ok(GeneratedQuery { query, usage, attempts });
            }

            let reason = if verdict.reason.trim().is_empty() {
                REJECTED_REASON.to_string()
            } else {
                verdict.reason
            };
            warn!(attempt = index, %reason, "Query rejected by engine");
            errors.push(reason.clone());
            attempts.push(GenerationAttempt {
                index,
                query,
                valid: false,
                reason,
            });
        }

        Err(Error::QueryGenerationExhausted {
            attempts: self.max_attempts,
            errors,
        })
    }
}
