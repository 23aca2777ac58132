//! End-to-end scenarios for the generate-validate loop and the service.

use async_trait::async_trait;
use chrono::NaiveDate;
use querysmith_config::{EngineSettings, PromptTemplates};
use querysmith_core::{
    ConnectionHandle, ConnectionInfo, DatasetConfig, DatasetStore, Error, Example, ExampleCategory,
    Generation, GenerationError, GenerationModelProvider, ModelConfig, NanoUsd, OutputShape,
    QueryEngineError, QueryEngineProvider, UsageAccount, Validation,
};
use querysmith_engine::{
    AnswerRequest, ChatService, ContextAssembler, GenerationLoop, GenerationRequest, MacroContext,
    Orchestrator, PromptBuilder, ProviderResolver,
};
use querysmith_store::InMemoryStore;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Returns scripted generations in order and records every system prompt.
struct MockModel {
    script: Mutex<VecDeque<Result<Generation, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    fn new(script: Vec<Result<Generation, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn sql(queries: &[(&str, u64)]) -> Self {
        Self::new(
            queries
                .iter()
                .map(|(text, tokens)| Ok(generation(text, *tokens)))
                .collect(),
        )
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

fn generation(text: &str, input_tokens: u64) -> Generation {
    Generation {
        text: text.to_string(),
        usage: UsageAccount::new(input_tokens, 20, NanoUsd(input_tokens * 1_000)),
    }
}

#[async_trait]
impl GenerationModelProvider for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn validate_settings(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn generate(&self, system_prompt: &str, _user_prompt: &str) -> Result<Generation, GenerationError> {
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockModel: script exhausted")
    }

    fn cost(&self, input_tokens: u64, _output_tokens: u64) -> NanoUsd {
        NanoUsd(input_tokens * 1_000)
    }
}

/// A SQL engine that appends or lowers `LIMIT` and replays verdicts.
struct MockSqlEngine {
    verdicts: Mutex<VecDeque<Validation>>,
    executed: Mutex<Vec<String>>,
}

impl MockSqlEngine {
    fn new(verdicts: Vec<Validation>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryEngineProvider for MockSqlEngine {
    fn name(&self) -> &str {
        "postgres"
    }

    fn output_shape(&self) -> OutputShape {
        OutputShape::Sql
    }

    async fn connect(&self, _conn: &ConnectionInfo) -> Result<ConnectionHandle, QueryEngineError> {
        Ok(ConnectionHandle {
            engine: "postgres".into(),
            server_version: None,
        })
    }

    async fn validate_query(
        &self,
        _conn: &ConnectionInfo,
        _refs: &[String],
        _query: &str,
    ) -> Result<Validation, QueryEngineError> {
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockSqlEngine: no verdict left"))
    }

    async fn execute(&self, _conn: &ConnectionInfo, _refs: &[String], query: &str) -> Result<Value, QueryEngineError> {
        self.executed.lock().unwrap().push(query.to_string());
        Ok(json!([{ "name": "Alice", "spend": 1200 }]))
    }

    async fn describe_schema(
        &self,
        _refs: &[String],
        _conn: &ConnectionInfo,
    ) -> Result<Option<String>, QueryEngineError> {
        Ok(Some("customers(name text, total_spend numeric)".into()))
    }

    fn clamp_result_size(&self, query: &str, max_rows: u64) -> Result<String, String> {
        match query.rsplit_once("LIMIT ") {
            Some((head, n)) => {
                let n: u64 = n.trim().parse().map_err(|_| format!("bad LIMIT in {query}"))?;
                Ok(format!("{head}LIMIT {}", n.min(max_rows)))
            }
            None => Ok(format!("{query} LIMIT {max_rows}")),
        }
    }
}

fn connection() -> ConnectionInfo {
    ConnectionInfo {
        id: 1,
        name: "warehouse".into(),
        kind: "postgres".into(),
        url: "postgres://localhost/shop".into(),
        username: None,
        password: None,
        is_active: true,
    }
}

fn macro_context(refs: &[String]) -> MacroContext<'_> {
    MacroContext {
        today: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        db_type: "postgres",
        dataset_refs: refs,
        schema: Some("customers(name text, total_spend numeric)"),
        chat_history: None,
        default_row_count: 10,
        max_row_count: 100,
    }
}

fn example(id: i64, key: &str, value: &str, category: ExampleCategory) -> Example {
    Example {
        id,
        key: key.into(),
        value: value.into(),
        category,
        embedding: None,
    }
}

#[tokio::test]
async fn second_attempt_sees_first_failure_and_succeeds() {
    let settings = EngineSettings {
        max_attempts: 3,
        ..EngineSettings::default()
    };
    let question = "top 5 customers by spend";
    let examples = vec![
        example(1, "list all customers", "SELECT name FROM customers", ExampleCategory::Core),
        example(2, "warehouse stock levels in europe", "SELECT * FROM stock", ExampleCategory::Semantic),
    ];
    let sections = ContextAssembler::new(&settings).assemble(question, &examples, &[], None);
    assert!(sections.examples.as_deref().unwrap().contains("list all customers"));
    assert!(!sections.examples.as_deref().unwrap().contains("warehouse stock"));

    let refs = vec!["customers".to_string()];
    let macros = macro_context(&refs);
    let conn = connection();
    let llm = MockModel::sql(&[
        ("SELECT name FROM customers ORDER BY spend DESC LIMIT 5", 100),
        ("SELECT name FROM customers ORDER BY total_spend DESC LIMIT 5", 140),
    ]);
    let engine = MockSqlEngine::new(vec![
        Validation::rejected("unknown field `spend`"),
        Validation::accepted(),
    ]);

    let generated = GenerationLoop::new(PromptBuilder::default(), settings.max_attempts, settings.max_row_count)
        .run(
            &GenerationRequest {
                base_prompt: "Answer with SQL over {TABLE_NAMES}.\n{TABLE_INFO}",
                business_rules: None,
                sections: &sections,
                macros: &macros,
                user_prompt: question,
                connection: &conn,
                dataset_refs: &refs,
            },
            &llm,
            &engine,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(generated.query, "SELECT name FROM customers ORDER BY total_spend DESC LIMIT 5");
    assert_eq!(generated.attempts.len(), 2);
    assert_eq!(llm.calls(), 2);
    assert!(llm.prompt(1).contains("unknown field `spend`"));
    assert!(!llm.prompt(0).contains("unknown field `spend`"));
    assert_eq!(
        generated.usage,
        generation("", 100).usage + generation("", 140).usage
    );
}

#[tokio::test]
async fn single_attempt_budget_exhausts_with_one_reason() {
    let refs = vec!["customers".to_string()];
    let macros = macro_context(&refs);
    let conn = connection();
    let sections = Default::default();
    let llm = MockModel::sql(&[("SELECT spend FROM customers", 50)]);
    let engine = MockSqlEngine::new(vec![Validation::rejected("unknown field `spend`")]);

    let err = GenerationLoop::new(PromptBuilder::default(), 1, 100)
        .run(
            &GenerationRequest {
                base_prompt: "SQL please",
                business_rules: None,
                sections: &sections,
                macros: &macros,
                user_prompt: "top 5 customers by spend",
                connection: &conn,
                dataset_refs: &refs,
            },
            &llm,
            &engine,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::QueryGenerationExhausted { attempts, errors } => {
            assert_eq!(attempts, 1);
            assert_eq!(errors, vec!["unknown field `spend`".to_string()]);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn content_policy_rejection_is_terminal() {
    let refs = vec!["customers".to_string()];
    let macros = macro_context(&refs);
    let conn = connection();
    let sections = Default::default();
    let llm = MockModel::new(vec![Err(GenerationError::ContentPolicy("flagged".into()))]);
    let engine = MockSqlEngine::new(vec![]);

    let err = GenerationLoop::new(PromptBuilder::default(), 3, 100)
        .run(
            &GenerationRequest {
                base_prompt: "SQL please",
                business_rules: None,
                sections: &sections,
                macros: &macros,
                user_prompt: "top 5 customers by spend",
                connection: &conn,
                dataset_refs: &refs,
            },
            &llm,
            &engine,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Generation(GenerationError::ContentPolicy(_))));
    assert_eq!(llm.calls(), 1);
}

struct Providers {
    llm: Arc<MockModel>,
    engine: Arc<MockSqlEngine>,
}

impl ProviderResolver for Providers {
    fn generation_model(&self, _model: &ModelConfig) -> querysmith_core::Result<Arc<dyn GenerationModelProvider>> {
        Ok(self.llm.clone())
    }

    fn query_engine(&self, _conn: &ConnectionInfo) -> querysmith_core::Result<Arc<dyn QueryEngineProvider>> {
        Ok(self.engine.clone())
    }
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    let connection_id = store.insert_connection(connection()).await;
    let dataset_id = store
        .insert_dataset(DatasetConfig {
            id: 0,
            name: "shop".into(),
            connection_id,
            dataset_refs: vec!["customers".into()],
            custom_prompt: None,
            business_rules: Some("Spend is total_spend.".into()),
            is_active: true,
        })
        .await;
    store
        .add_example(dataset_id, "list all customers", "SELECT name FROM customers", ExampleCategory::Core)
        .await
        .unwrap();
    store
        .insert_model(ModelConfig {
            id: 0,
            name: "mock".into(),
            kind: "openai".into(),
            settings: HashMap::new(),
            is_active: true,
        })
        .await;
    store
}

#[tokio::test]
async fn oversized_query_is_clamped_before_execution() {
    let store = seeded_store().await;
    let llm = Arc::new(MockModel::sql(&[
        ("SELECT name FROM customers ORDER BY total_spend DESC LIMIT 5000", 80),
        ("Alice spent the most.", 60),
    ]));
    let engine = Arc::new(MockSqlEngine::new(vec![Validation::accepted()]));
    let orchestrator = Orchestrator::new(EngineSettings::default(), PromptTemplates::default(), store.clone());
    let service = ChatService::new(store.clone(), orchestrator).with_providers(Arc::new(Providers {
        llm: llm.clone(),
        engine: engine.clone(),
    }));

    let response = service
        .answer_question(AnswerRequest {
            question: "top customers by spend".into(),
            session_id: Some("session-1".into()),
            dataset: "shop".into(),
        })
        .await
        .unwrap();

    assert_eq!(response.session_id, "session-1");
    let executed = engine.executed.lock().unwrap().clone();
    assert_eq!(executed, vec!["SELECT name FROM customers ORDER BY total_spend DESC LIMIT 100"]);
    let envelope = response.envelope().unwrap();
    assert_eq!(envelope.text, "Alice spent the most.");
    assert_eq!(envelope.data[0]["name"], "Alice");
    assert!(llm.prompt(0).contains("BUSINESS RULES:\nSpend is total_spend."));

    let record = store.chat_record(response.correlation_id).await.unwrap().unwrap();
    assert_eq!(record.usage, generation("", 80).usage + generation("", 60).usage);
    assert_eq!(record.query, executed[0]);
}

#[tokio::test]
async fn cancellation_stops_the_run_without_persisting() {
    let store = seeded_store().await;
    let llm = Arc::new(MockModel::sql(&[]));
    let engine = Arc::new(MockSqlEngine::new(vec![]));
    let orchestrator = Orchestrator::new(EngineSettings::default(), PromptTemplates::default(), store.clone());
    let service = ChatService::new(store.clone(), orchestrator).with_providers(Arc::new(Providers {
        llm: llm.clone(),
        engine,
    }));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = service
        .answer_question_with_cancel(
            AnswerRequest {
                question: "top customers".into(),
                session_id: None,
                dataset: "shop".into(),
            },
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(llm.calls(), 0);
    assert!(store.records().await.is_empty());
}
