//! The workflow orchestrator: schema -> query -> execution -> answer.
//!
//! Stateless between invocations. Configuration is injected once at
//! construction; everything a single question needs lives on the stack of
//! [`Orchestrator::run`].

use chrono::{Local, NaiveDate};
use querysmith_config::{EngineSettings, PromptTemplates, RankingStrategy};
use querysmith_core::{
    ConnectionInfo, DatasetConfig, DatasetStore, Error, GenerationModelProvider, QueryEngineProvider,
    Result, SessionId, UsageAccount, format_history,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::ContextAssembler;
use crate::generation::{GenerationAttempt, GenerationLoop, GenerationRequest};
use crate::macros::{MacroContext, MacroResolver};
use crate::prompt::PromptBuilder;

/// One question against one dataset.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowRequest<'a> {
    pub dataset: &'a DatasetConfig,
    pub connection: &'a ConnectionInfo,
    pub question: &'a str,
    pub session_id: &'a SessionId,
}

/// The result of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome {
    /// Natural-language answer.
    pub answer: String,
    /// Raw engine result the answer was written from.
    pub result: Value,
    /// The query actually executed.
    pub query: String,
    /// Query generation plus answer synthesis.
    pub usage: UsageAccount,
    pub attempts: Vec<GenerationAttempt>,
    /// Computed for embedding ranking; stored with the turn for reuse.
    pub question_embedding: Option<Vec<f32>>,
}

pub struct Orchestrator {
    settings: EngineSettings,
    templates: PromptTemplates,
    store: Arc<dyn DatasetStore>,
    resolver: MacroResolver,
    assembler: ContextAssembler,
    generation: GenerationLoop,
    prompts: PromptBuilder,
    today: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(settings: EngineSettings, templates: PromptTemplates, store: Arc<dyn DatasetStore>) -> Self {
        let resolver = MacroResolver::new();
        let prompts = PromptBuilder::new(resolver);
        Self {
            assembler: ContextAssembler::new(&settings),
            generation: GenerationLoop::new(prompts, settings.max_attempts, settings.max_row_count),
            settings,
            templates,
            store,
            resolver,
            prompts,
            today: None,
        }
    }

    /// Pin the date macros resolve against instead of the local calendar.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &MacroResolver {
        &self.resolver
    }

    pub async fn run(
        &self,
        request: WorkflowRequest<'_>,
        llm: &dyn GenerationModelProvider,
        engine: &dyn QueryEngineProvider,
        cancel: &CancellationToken,
    ) -> Result<WorkflowOutcome> {
        let dataset = request.dataset;
        let refs = dataset.dataset_refs.as_slice();
        info!(dataset = %dataset.name, session_id = %request.session_id, "Answering question");

        let schema = self.load_schema(dataset, request.connection, engine, cancel).await?;

        let history = self
            .store
            .session_history(request.session_id, self.settings.history_length)
            .await?;
        let history = format_history(&history);

        let examples = self.store.examples(dataset.id).await?;
        let feedback = self.store.feedback_turns(dataset.id).await?;
        let question_embedding = self.question_embedding(request.question, llm, cancel).await?;
        let sections = self
            .assembler
            .assemble(request.question, &examples, &feedback, question_embedding.as_deref());

        let base_prompt = self.base_prompt(dataset, engine.name())?;
        let macros = MacroContext {
            today: self.today.unwrap_or_else(|| Local::now().date_naive()),
            db_type: engine.name(),
            dataset_refs: refs,
            schema: schema.as_deref(),
            chat_history: Some(history.as_str()),
            default_row_count: self.settings.default_row_count,
            max_row_count: self.settings.max_row_count,
        };
        let user_prompt = self
            .prompts
            .render(&self.templates.user, &macros, &[("QUESTION", request.question)]);

        let generated = self
            .generation
            .run(
                &GenerationRequest {
                    base_prompt,
                    business_rules: dataset.business_rules.as_deref(),
                    sections: &sections,
                    macros: &macros,
                    user_prompt: &user_prompt,
                    connection: request.connection,
                    dataset_refs: refs,
                },
                llm,
                engine,
                cancel,
            )
            .await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = engine.execute(request.connection, refs, &generated.query) => result?,
        };
        debug!(dataset = %dataset.name, "Query executed");

        let rendered_result = serde_json::to_string_pretty(&result)?;
        let answer_system = self.prompts.render(&self.templates.answer_system, &macros, &[]);
        let answer_user = self.prompts.render(
            &self.templates.answer_user,
            &macros,
            &[("QUESTION", request.question), ("RESULT", &rendered_result)],
        );
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = llm.generate(&answer_system, &answer_user) => result?,
        };

        let usage = generated.usage + answer.usage;
        info!(
            dataset = %dataset.name,
            attempts = generated.attempts.len(),
            total_tokens = usage.total_tokens,
            cost = %usage.cost,
            "Question answered"
        );

        Ok(WorkflowOutcome {
            answer: answer.text.trim().to_string(),
            result,
            query: generated.query,
            usage,
            attempts: generated.attempts,
            question_embedding,
        })
    }

    fn base_prompt<'a>(&'a self, dataset: &'a DatasetConfig, engine_kind: &str) -> Result<&'a str> {
        if let Some(custom) = dataset.custom_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(custom);
        }
        self.templates
            .query_generation(engine_kind)
            .ok_or_else(|| Error::InvalidPrompt(format!("no query-generation prompt for engine '{engine_kind}'")))
    }

    /// Static override file first, then the engine's own description.
    async fn load_schema(
        &self,
        dataset: &DatasetConfig,
        conn: &ConnectionInfo,
        engine: &dyn QueryEngineProvider,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if let Some(path) = self.schema_override_path(dataset) {
            match tokio::fs::read_to_string(&path).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(path = %path.display(), "Using static schema");
                    return Ok(Some(text));
                }
                Ok(_) => debug!(path = %path.display(), "Static schema is empty"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "No static schema")
                }
                Err(e) => warn!(path = %path.display(), "Static schema unreadable, describing live: {e}"),
            }
        }

        let schema = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = engine.describe_schema(&dataset.dataset_refs, conn) => result?,
        };
        if schema.is_none() {
            warn!(dataset = %dataset.name, "Engine returned no schema");
        }
        Ok(schema)
    }

    fn schema_override_path(&self, dataset: &DatasetConfig) -> Option<PathBuf> {
        self.settings
            .schema_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.txt", dataset.id)))
    }

    /// Embed the question for ranking. A failed embedding falls back to
    /// lexical ranking; only cancellation is an error.
    async fn question_embedding(
        &self,
        question: &str,
        llm: &dyn GenerationModelProvider,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<f32>>> {
        if self.settings.ranking != RankingStrategy::Embedding {
            return Ok(None);
        }
        let embedded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = llm.embed(question) => result,
        };
        Ok(match embedded {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Question embedding failed, ranking lexically: {e}");
                None
            }
        })
    }
}
