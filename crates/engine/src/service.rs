//! `ChatService`: the inbound "answer question" operation and its
//! persistence, plus the reviewer and authoring hooks.

use chrono::Utc;
use querysmith_core::{
    ChatMessage, ChatRecord, ConnectionInfo, DatasetConfig, DatasetStore, Error, ExampleCategory,
    GenerationModelProvider, ModelConfig, QueryEngineProvider, Result, SessionId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::embedding::{EmbeddingJob, EmbeddingQueue};
use crate::orchestrator::{Orchestrator, WorkflowRequest};

/// Builds providers for a resolved model and connection.
pub trait ProviderResolver: Send + Sync {
    fn generation_model(&self, model: &ModelConfig) -> Result<Arc<dyn GenerationModelProvider>>;
    fn query_engine(&self, conn: &ConnectionInfo) -> Result<Arc<dyn QueryEngineProvider>>;
}

/// Resolves providers through the closed registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryResolver;

impl ProviderResolver for RegistryResolver {
    fn generation_model(&self, model: &ModelConfig) -> Result<Arc<dyn GenerationModelProvider>> {
        querysmith_providers::llm_provider(&model.kind, &model.settings)
    }

    fn query_engine(&self, conn: &ConnectionInfo) -> Result<Arc<dyn QueryEngineProvider>> {
        querysmith_providers::query_engine_provider(&conn.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    /// Generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Dataset name.
    pub dataset: String,
}

/// The JSON document carried in [`AnswerResponse::answer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub text: String,
    pub data: Value,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question: String,
    /// JSON-encoded [`AnswerEnvelope`].
    pub answer: String,
    pub session_id: String,
    /// Id of the analytics row; pass it back to record feedback.
    pub correlation_id: i64,
}

impl AnswerResponse {
    pub fn envelope(&self) -> Result<AnswerEnvelope> {
        Ok(serde_json::from_str(&self.answer)?)
    }
}

pub struct ChatService {
    store: Arc<dyn DatasetStore>,
    orchestrator: Orchestrator,
    providers: Arc<dyn ProviderResolver>,
    embeddings: Option<EmbeddingQueue>,
    deadline: Duration,
}

impl ChatService {
    pub fn new(store: Arc<dyn DatasetStore>, orchestrator: Orchestrator) -> Self {
        let deadline = Duration::from_secs(orchestrator.settings().request_timeout_secs.max(1));
        Self {
            store,
            orchestrator,
            providers: Arc::new(RegistryResolver),
            embeddings: None,
            deadline,
        }
    }

    pub fn with_providers(mut self, providers: Arc<dyn ProviderResolver>) -> Self {
        self.providers = providers;
        self
    }

    /// Queue embeddings for new examples and approved answers.
    pub fn with_embedding_queue(mut self, queue: EmbeddingQueue) -> Self {
        self.embeddings = Some(queue);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn answer_question(&self, request: AnswerRequest) -> Result<AnswerResponse> {
        self.answer_question_with_cancel(request, &CancellationToken::new()).await
    }

    /// Answer a question, abandoning the work when `cancel` fires or the
    /// deadline passes.
    pub async fn answer_question_with_cancel(
        &self,
        request: AnswerRequest,
        cancel: &CancellationToken,
    ) -> Result<AnswerResponse> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("Question must not be empty.".into()));
        }
        let session_id = match request.session_id.as_deref() {
            None => SessionId::generate(),
            Some(raw) => SessionId::parse(raw)
                .ok_or_else(|| Error::InvalidRequest("Session id must not be blank.".into()))?,
        };

        let dataset = self.active_dataset(&request.dataset).await?;
        let connection = self.active_connection(&dataset).await?;
        let model = self
            .store
            .active_model()
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Model",
                name: "active model".into(),
            })?;

        let llm = self.providers.generation_model(&model)?;
        llm.validate_settings()?;
        let engine = self.providers.query_engine(&connection)?;

        let started_at = Utc::now();
        let token = cancel.child_token();
        let run = self.orchestrator.run(
            WorkflowRequest {
                dataset: &dataset,
                connection: &connection,
                question,
                session_id: &session_id,
            },
            llm.as_ref(),
            engine.as_ref(),
            &token,
        );
        let outcome = match tokio::time::timeout(self.deadline, run).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                token.cancel();
                warn!(dataset = %dataset.name, session_id = %session_id, "Deadline exceeded");
                return Err(Error::DeadlineExceeded {
                    secs: self.deadline.as_secs(),
                });
            }
        };
        let completed_at = Utc::now();

        let envelope = AnswerEnvelope {
            text: outcome.answer.clone(),
            data: outcome.result.clone(),
            query: outcome.query.clone(),
        };
        let answer = serde_json::to_string(&envelope)?;

        let messages = vec![
            ChatMessage::human(session_id.clone(), question),
            ChatMessage::ai(session_id.clone(), outcome.answer.clone()),
        ];
        // History only follows a stored record
        let correlation_id = self
            .store
            .append_record(ChatRecord {
                id: 0,
                dataset_id: dataset.id,
                model_id: model.id,
                session_id: session_id.clone(),
                question: question.to_string(),
                answer: outcome.answer,
                query: outcome.query,
                usage: outcome.usage,
                correct: None,
                cached: false,
                started_at,
                completed_at,
                question_embedding: outcome.question_embedding,
            })
            .await?;
        self.store.append_messages(messages).await?;

        info!(
            dataset = %dataset.name,
            session_id = %session_id,
            chat_id = correlation_id,
            "Answer recorded"
        );
        Ok(AnswerResponse {
            question: question.to_string(),
            answer,
            session_id: session_id.to_string(),
            correlation_id,
        })
    }

    /// Record a reviewer verdict. Approved turns get their question
    /// embedded so they can be reused as feedback.
    pub async fn record_feedback(&self, chat_id: i64, correct: bool) -> Result<()> {
        self.store.set_feedback(chat_id, correct).await.map_err(|e| match e {
            querysmith_core::StoreError::NotFound(_) => Error::NotFound {
                kind: "Chat",
                name: chat_id.to_string(),
            },
            other => other.into(),
        })?;
        info!(chat_id, correct, "Feedback recorded");

        if !correct {
            return Ok(());
        }
        if let (Some(queue), Some(record)) = (&self.embeddings, self.store.chat_record(chat_id).await?) {
            if record.question_embedding.is_none() {
                queue.enqueue(EmbeddingJob::Record {
                    id: chat_id,
                    text: record.question,
                });
            }
        }
        Ok(())
    }

    /// Store an example; its embedding is computed in the background.
    pub async fn add_example(
        &self,
        dataset: &str,
        key: &str,
        value: &str,
        category: ExampleCategory,
    ) -> Result<i64> {
        if key.trim().is_empty() || value.trim().is_empty() {
            return Err(Error::InvalidRequest("Example question and answer must not be empty.".into()));
        }
        let dataset = self
            .store
            .dataset_by_name(dataset)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Dataset",
                name: dataset.to_string(),
            })?;
        let id = self.store.add_example(dataset.id, key.trim(), value.trim(), category).await?;
        if let Some(queue) = &self.embeddings {
            queue.enqueue(EmbeddingJob::Example {
                id,
                text: key.trim().to_string(),
            });
        }
        Ok(id)
    }

    async fn active_dataset(&self, name: &str) -> Result<DatasetConfig> {
        let dataset = self
            .store
            .dataset_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Dataset",
                name: name.to_string(),
            })?;
        if !dataset.is_active {
            return Err(Error::Disabled {
                kind: "Dataset",
                name: dataset.name,
            });
        }
        Ok(dataset)
    }

    async fn active_connection(&self, dataset: &DatasetConfig) -> Result<ConnectionInfo> {
        let connection = self
            .store
            .connection(dataset.connection_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: "Connection",
                name: dataset.connection_id.to_string(),
            })?;
        if !connection.is_active {
            return Err(Error::Disabled {
                kind: "Connection",
                name: connection.name,
            });
        }
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedEngine, ScriptedModel, connection, dataset};
    use querysmith_config::{EngineSettings, PromptTemplates};
    use querysmith_core::{Example, FeedbackTurn, PurgeCounts, StoreError, Validation};
    use querysmith_store::InMemoryStore;
    use std::collections::HashMap;

    struct Fixed {
        llm: Arc<ScriptedModel>,
        engine: Arc<ScriptedEngine>,
    }

    impl ProviderResolver for Fixed {
        fn generation_model(&self, _model: &ModelConfig) -> Result<Arc<dyn GenerationModelProvider>> {
            Ok(self.llm.clone())
        }

        fn query_engine(&self, _conn: &ConnectionInfo) -> Result<Arc<dyn QueryEngineProvider>> {
            Ok(self.engine.clone())
        }
    }

    async fn seeded_store(active: bool) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_connection(connection()).await;
        store
            .insert_dataset(DatasetConfig {
                is_active: active,
                ..dataset()
            })
            .await;
        store
            .insert_model(ModelConfig {
                id: 0,
                name: "gpt".into(),
                kind: "openai".into(),
                settings: HashMap::new(),
                is_active: true,
            })
            .await;
        store
    }

    fn service(store: Arc<InMemoryStore>, llm: ScriptedModel, engine: ScriptedEngine) -> ChatService {
        let orchestrator = Orchestrator::new(EngineSettings::default(), PromptTemplates::default(), store.clone());
        ChatService::new(store, orchestrator).with_providers(Arc::new(Fixed {
            llm: Arc::new(llm),
            engine: Arc::new(engine),
        }))
    }

    fn ask(question: &str) -> AnswerRequest {
        AnswerRequest {
            question: question.into(),
            session_id: None,
            dataset: "sales".into(),
        }
    }

    #[tokio::test]
    async fn answer_is_persisted_and_enveloped() {
        let store = seeded_store(true).await;
        let svc = service(
            store.clone(),
            ScriptedModel::texts(&[r#"{"size": 3}"#, "Three orders."]),
            ScriptedEngine::new(vec![Validation::accepted()]),
        );

        let response = svc.answer_question(ask("  how many orders?  ")).await.unwrap();
        assert_eq!(response.question, "how many orders?");
        let envelope = response.envelope().unwrap();
        assert_eq!(envelope.text, "Three orders.");
        assert_eq!(envelope.query, r#"{"size":3}"#);
        assert_eq!(envelope.data["total"], 3);
        assert!(!response.session_id.is_empty());

        assert_eq!(store.message_count().await, 2);
        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, response.correlation_id);
        assert_eq!(records[0].correct, None);
        assert!(!records[0].cached);
        assert_eq!(records[0].usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let store = seeded_store(true).await;
        let svc = service(store, ScriptedModel::texts(&[]), ScriptedEngine::new(vec![]));
        assert!(matches!(
            svc.answer_question(ask("   ")).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn blank_session_id_is_rejected_not_replaced() {
        let store = seeded_store(true).await;
        let svc = service(store.clone(), ScriptedModel::texts(&[]), ScriptedEngine::new(vec![]));
        for raw in ["", "   "] {
            let request = AnswerRequest {
                session_id: Some(raw.into()),
                ..ask("q")
            };
            assert!(matches!(
                svc.answer_question(request).await,
                Err(Error::InvalidRequest(msg)) if msg.contains("Session id")
            ));
        }
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn supplied_session_id_is_kept() {
        let store = seeded_store(true).await;
        let svc = service(
            store.clone(),
            ScriptedModel::texts(&["{}", "ok"]),
            ScriptedEngine::new(vec![Validation::accepted()]),
        );
        let request = AnswerRequest {
            session_id: Some(" s-42 ".into()),
            ..ask("q")
        };
        let response = svc.answer_question(request).await.unwrap();
        assert_eq!(response.session_id, "s-42");
        assert_eq!(store.records().await[0].session_id.as_str(), "s-42");
    }

    /// Delegates to an in-memory store but refuses analytics rows.
    struct RecordlessStore(Arc<InMemoryStore>);

    #[async_trait::async_trait]
    impl DatasetStore for RecordlessStore {
        fn name(&self) -> &str {
            "recordless"
        }

        async fn dataset_by_name(&self, name: &str) -> std::result::Result<Option<DatasetConfig>, StoreError> {
            self.0.dataset_by_name(name).await
        }

        async fn connection(&self, id: i64) -> std::result::Result<Option<ConnectionInfo>, StoreError> {
            self.0.connection(id).await
        }

        async fn active_model(&self) -> std::result::Result<Option<ModelConfig>, StoreError> {
            self.0.active_model().await
        }

        async fn examples(&self, dataset_id: i64) -> std::result::Result<Vec<Example>, StoreError> {
            self.0.examples(dataset_id).await
        }

        async fn add_example(
            &self,
            dataset_id: i64,
            key: &str,
            value: &str,
            category: ExampleCategory,
        ) -> std::result::Result<i64, StoreError> {
            self.0.add_example(dataset_id, key, value, category).await
        }

        async fn set_example_embedding(&self, example_id: i64, embedding: Vec<f32>) -> std::result::Result<(), StoreError> {
            self.0.set_example_embedding(example_id, embedding).await
        }

        async fn examples_missing_embedding(&self) -> std::result::Result<Vec<Example>, StoreError> {
            self.0.examples_missing_embedding().await
        }

        async fn feedback_turns(&self, dataset_id: i64) -> std::result::Result<Vec<FeedbackTurn>, StoreError> {
            self.0.feedback_turns(dataset_id).await
        }

        async fn session_history(
            &self,
            session_id: &SessionId,
            limit: usize,
        ) -> std::result::Result<Vec<ChatMessage>, StoreError> {
            self.0.session_history(session_id, limit).await
        }

        async fn append_messages(&self, messages: Vec<ChatMessage>) -> std::result::Result<(), StoreError> {
            self.0.append_messages(messages).await
        }

        async fn append_record(&self, _record: ChatRecord) -> std::result::Result<i64, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn chat_record(&self, id: i64) -> std::result::Result<Option<ChatRecord>, StoreError> {
            self.0.chat_record(id).await
        }

        async fn set_feedback(&self, chat_id: i64, correct: bool) -> std::result::Result<(), StoreError> {
            self.0.set_feedback(chat_id, correct).await
        }

        async fn set_record_embedding(&self, chat_id: i64, embedding: Vec<f32>) -> std::result::Result<(), StoreError> {
            self.0.set_record_embedding(chat_id, embedding).await
        }

        async fn purge_before(&self, cutoff: chrono::DateTime<Utc>) -> std::result::Result<PurgeCounts, StoreError> {
            self.0.purge_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn failed_record_write_leaves_no_history() {
        let inner = seeded_store(true).await;
        let store: Arc<dyn DatasetStore> = Arc::new(RecordlessStore(inner.clone()));
        let orchestrator = Orchestrator::new(EngineSettings::default(), PromptTemplates::default(), store.clone());
        let svc = ChatService::new(store, orchestrator).with_providers(Arc::new(Fixed {
            llm: Arc::new(ScriptedModel::texts(&["{}", "ok"])),
            engine: Arc::new(ScriptedEngine::new(vec![Validation::accepted()])),
        }));

        let err = svc.answer_question(ask("q")).await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Storage(_))), "{err:?}");
        assert_eq!(inner.message_count().await, 0);
    }

    #[tokio::test]
    async fn inactive_dataset_is_disabled() {
        let store = seeded_store(false).await;
        let svc = service(store, ScriptedModel::texts(&[]), ScriptedEngine::new(vec![]));
        assert!(matches!(
            svc.answer_question(ask("q")).await,
            Err(Error::Disabled { kind: "Dataset", .. })
        ));
    }

    #[tokio::test]
    async fn unknown_dataset_is_not_found() {
        let store = seeded_store(true).await;
        let svc = service(store, ScriptedModel::texts(&[]), ScriptedEngine::new(vec![]));
        let request = AnswerRequest {
            dataset: "nope".into(),
            ..ask("q")
        };
        assert!(matches!(
            svc.answer_question(request).await,
            Err(Error::NotFound { kind: "Dataset", .. })
        ));
    }

    #[tokio::test]
    async fn failed_runs_persist_nothing() {
        let store = seeded_store(true).await;
        let svc = service(
            store.clone(),
            ScriptedModel::texts(&["{}"]),
            ScriptedEngine::unreachable(),
        );
        let err = svc.answer_question(ask("q")).await.unwrap_err();
        assert!(err.is_connection_failure());
        assert_eq!(store.message_count().await, 0);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn approved_feedback_queues_question_embedding() {
        let store = seeded_store(true).await;
        let (queue, mut rx) = EmbeddingQueue::channel(8);
        let svc = service(
            store.clone(),
            ScriptedModel::texts(&["{}", "ok"]),
            ScriptedEngine::new(vec![Validation::accepted()]),
        )
        .with_embedding_queue(queue);

        let response = svc.answer_question(ask("top customers")).await.unwrap();
        svc.record_feedback(response.correlation_id, true).await.unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            EmbeddingJob::Record {
                id: response.correlation_id,
                text: "top customers".into()
            }
        );
        assert_eq!(store.feedback_turns(1).await.unwrap().len(), 1);

        assert!(matches!(
            svc.record_feedback(999, true).await,
            Err(Error::NotFound { kind: "Chat", .. })
        ));
    }

    #[tokio::test]
    async fn new_examples_are_queued_for_embedding() {
        let store = seeded_store(true).await;
        let (queue, mut rx) = EmbeddingQueue::channel(8);
        let svc = service(store.clone(), ScriptedModel::texts(&[]), ScriptedEngine::new(vec![]))
            .with_embedding_queue(queue);

        let id = svc
            .add_example("sales", "orders per day", r#"{"size":0}"#, ExampleCategory::Semantic)
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), EmbeddingJob::Example { id, text: "orders per day".into() });
        assert_eq!(store.examples(1).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_the_run() {
        struct Stalled;

        #[async_trait::async_trait]
        impl GenerationModelProvider for Stalled {
            fn name(&self) -> &str {
                "stalled"
            }
            fn validate_settings(&self) -> Result<()> {
                Ok(())
            }
            async fn generate(
                &self,
                _system: &str,
                _user: &str,
            ) -> std::result::Result<querysmith_core::Generation, querysmith_core::GenerationError> {
                std::future::pending().await
            }
            fn cost(&self, _i: u64, _o: u64) -> querysmith_core::NanoUsd {
                querysmith_core::NanoUsd::ZERO
            }
        }

        struct StalledResolver(Arc<ScriptedEngine>);
        impl ProviderResolver for StalledResolver {
            fn generation_model(&self, _model: &ModelConfig) -> Result<Arc<dyn GenerationModelProvider>> {
                Ok(Arc::new(Stalled))
            }
            fn query_engine(&self, _conn: &ConnectionInfo) -> Result<Arc<dyn QueryEngineProvider>> {
                Ok(self.0.clone())
            }
        }

        let store = seeded_store(true).await;
        let orchestrator = Orchestrator::new(EngineSettings::default(), PromptTemplates::default(), store.clone());
        let svc = ChatService::new(store.clone(), orchestrator)
            .with_providers(Arc::new(StalledResolver(Arc::new(ScriptedEngine::new(vec![])))))
            .with_deadline(Duration::from_secs(5));

        let err = svc.answer_question(ask("q")).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { secs: 5 }));
        assert!(store.records().await.is_empty());
    }
}
