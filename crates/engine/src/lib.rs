//! The querysmith workflow engine.
//!
//! A question goes through a fixed pipeline:
//!
//! 1. **Resolve schema** (static override file or the query engine)
//! 2. **Assemble context** (core and relevant examples, approved past turns)
//! 3. **Generate and validate** a query, retrying with the failure reasons
//!    of earlier attempts until one validates or the attempt budget runs out
//! 4. **Execute** the validated query
//! 5. **Answer** in natural language from the raw result
//!
//! [`ChatService`] wraps the pipeline with dataset/connection/model lookup,
//! a deadline, and persistence of the turn.

pub mod context;
pub mod embedding;
pub mod generation;
pub mod macros;
pub mod orchestrator;
pub mod prompt;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextAssembler, ContextSections};
pub use embedding::{EmbeddingJob, EmbeddingQueue};
pub use generation::{GeneratedQuery, GenerationAttempt, GenerationLoop, GenerationRequest};
pub use macros::{MacroContext, MacroInfo, MacroResolver, find_macros, substitute};
pub use orchestrator::{Orchestrator, WorkflowOutcome, WorkflowRequest};
pub use prompt::PromptBuilder;
pub use service::{
    AnswerEnvelope, AnswerRequest, AnswerResponse, ChatService, ProviderResolver, RegistryResolver,
};
