//! Shared test helpers: scripted providers and fixtures.

use async_trait::async_trait;
use chrono::NaiveDate;
use querysmith_core::{
    ConnectionHandle, ConnectionInfo, DatasetConfig, Error, Generation, GenerationError,
    GenerationModelProvider, NanoUsd, OutputShape, QueryEngineError, QueryEngineProvider,
    UsageAccount, Validation,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::macros::MacroContext;

/// A generation model that returns a sequence of scripted results.
///
/// Each call to `generate` returns the next result in the queue.
/// Panics if more calls are made than results provided.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<Generation, GenerationError>>>,
    system_prompts: Mutex<Vec<String>>,
    user_prompts: Mutex<Vec<String>>,
    embedding: Option<Vec<f32>>,
    embed_calls: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<Generation, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            system_prompts: Mutex::new(Vec::new()),
            user_prompts: Mutex::new(Vec::new()),
            embedding: None,
            embed_calls: Mutex::new(0),
        }
    }

    /// Successful generations of the given texts.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| {
                    Ok(Generation {
                        text: t.to_string(),
                        usage: Self::usage_per_call(),
                    })
                })
                .collect(),
        )
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn usage_per_call() -> UsageAccount {
        UsageAccount::new(10, 5, NanoUsd(1_500))
    }

    pub fn call_count(&self) -> usize {
        self.system_prompts.lock().unwrap().len()
    }

    pub fn embed_count(&self) -> usize {
        *self.embed_calls.lock().unwrap()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.user_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationModelProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn validate_settings(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation, GenerationError> {
        self.system_prompts.lock().unwrap().push(system_prompt.to_string());
        self.user_prompts.lock().unwrap().push(user_prompt.to_string());
        let call = self.call_count();
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedModel: no more responses (call #{call})"))
    }

    fn cost(&self, _input_tokens: u64, _output_tokens: u64) -> NanoUsd {
        NanoUsd::ZERO
    }

    async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>, GenerationError> {
        *self.embed_calls.lock().unwrap() += 1;
        Ok(self.embedding.clone())
    }
}

/// A JSON query engine with scripted validation verdicts.
pub struct ScriptedEngine {
    verdicts: Mutex<VecDeque<Validation>>,
    validated: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    schema: Option<String>,
    execution_error: Option<QueryEngineError>,
    unreachable: bool,
}

impl ScriptedEngine {
    pub fn new(verdicts: Vec<Validation>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            validated: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            schema: None,
            execution_error: None,
            unreachable: false,
        }
    }

    /// An engine whose every call fails with a connection error.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(vec![])
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_execution_error(mut self, error: QueryEngineError) -> Self {
        self.execution_error = Some(error);
        self
    }

    pub fn validated(&self) -> Vec<String> {
        self.validated.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> Result<(), QueryEngineError> {
        if self.unreachable {
            Err(QueryEngineError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueryEngineProvider for ScriptedEngine {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn output_shape(&self) -> OutputShape {
        OutputShape::Json
    }

    async fn connect(&self, _conn: &ConnectionInfo) -> Result<ConnectionHandle, QueryEngineError> {
        self.check_reachable()?;
        Ok(ConnectionHandle {
            engine: "elasticsearch".into(),
            server_version: Some("8.13.0".into()),
        })
    }

    async fn validate_query(
        &self,
        _conn: &ConnectionInfo,
        _dataset_refs: &[String],
        query: &str,
    ) -> Result<Validation, QueryEngineError> {
        self.check_reachable()?;
        self.validated.lock().unwrap().push(query.to_string());
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedEngine: no more verdicts for {query}")))
    }

    async fn execute(
        &self,
        _conn: &ConnectionInfo,
        _dataset_refs: &[String],
        query: &str,
    ) -> Result<Value, QueryEngineError> {
        self.check_reachable()?;
        self.executed.lock().unwrap().push(query.to_string());
        match &self.execution_error {
            Some(e) => Err(e.clone()),
            None => Ok(json!({ "total": 3, "hits": [] })),
        }
    }

    async fn describe_schema(
        &self,
        _dataset_refs: &[String],
        _conn: &ConnectionInfo,
    ) -> Result<Option<String>, QueryEngineError> {
        self.check_reachable()?;
        Ok(self.schema.clone())
    }

    fn clamp_result_size(&self, query: &str, max_rows: u64) -> Result<String, String> {
        let mut parsed: Value = serde_json::from_str(query).map_err(|e| format!("Query is not valid JSON: {e}"))?;
        let object = parsed.as_object_mut().ok_or("Query must be a JSON object")?;
        if object.get("size").and_then(Value::as_u64).is_some_and(|s| s > max_rows) {
            object.insert("size".into(), json!(max_rows));
        }
        serde_json::to_string(&parsed).map_err(|e| e.to_string())
    }
}

pub fn connection() -> ConnectionInfo {
    ConnectionInfo {
        id: 10,
        name: "search".into(),
        kind: "elasticsearch".into(),
        url: "http://localhost:9200".into(),
        username: None,
        password: None,
        is_active: true,
    }
}

pub fn dataset() -> DatasetConfig {
    DatasetConfig {
        id: 1,
        name: "sales".into(),
        connection_id: 10,
        dataset_refs: vec!["orders".into()],
        custom_prompt: None,
        business_rules: None,
        is_active: true,
    }
}

pub fn macro_context(refs: &[String]) -> MacroContext<'_> {
    MacroContext {
        today: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        db_type: "elasticsearch",
        dataset_refs: refs,
        schema: Some("orders: id long, spend double"),
        chat_history: None,
        default_row_count: 10,
        max_row_count: 100,
    }
}
