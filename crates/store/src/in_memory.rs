//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use querysmith_core::store::{DatasetStore, PurgeCounts};
use querysmith_core::{
    ChatMessage, ChatRecord, ConnectionInfo, DatasetConfig, Example, ExampleCategory, FeedbackTurn,
    ModelConfig, SessionId, StoreError,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_id: i64,
    datasets: Vec<DatasetConfig>,
    connections: Vec<ConnectionInfo>,
    models: Vec<ModelConfig>,
    /// (dataset_id, example), in insertion order
    examples: Vec<(i64, Example)>,
    messages: Vec<ChatMessage>,
    records: Vec<ChatRecord>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A store that keeps everything in process memory.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Register a connection, assigning an id when `id` is 0.
    pub async fn insert_connection(&self, mut conn: ConnectionInfo) -> i64 {
        let mut state = self.state.write().await;
        if conn.id == 0 {
            conn.id = state.allocate_id();
        }
        let id = conn.id;
        state.connections.push(conn);
        id
    }

    /// Register a dataset, assigning an id when `id` is 0.
    pub async fn insert_dataset(&self, mut dataset: DatasetConfig) -> i64 {
        let mut state = self.state.write().await;
        if dataset.id == 0 {
            dataset.id = state.allocate_id();
        }
        let id = dataset.id;
        state.datasets.push(dataset);
        id
    }

    /// Register a model, assigning an id when `id` is 0.
    pub async fn insert_model(&self, mut model: ModelConfig) -> i64 {
        let mut state = self.state.write().await;
        if model.id == 0 {
            model.id = state.allocate_id();
        }
        let id = model.id;
        state.models.push(model);
        id
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn records(&self) -> Vec<ChatRecord> {
        self.state.read().await.records.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatasetStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn dataset_by_name(&self, name: &str) -> Result<Option<DatasetConfig>, StoreError> {
        let state = self.state.read().await;
        Ok(state.datasets.iter().find(|d| d.name == name).cloned())
    }

    async fn connection(&self, id: i64) -> Result<Option<ConnectionInfo>, StoreError> {
        let state = self.state.read().await;
        Ok(state.connections.iter().find(|c| c.id == id).cloned())
    }

    async fn active_model(&self) -> Result<Option<ModelConfig>, StoreError> {
        let state = self.state.read().await;
        Ok(state.models.iter().find(|m| m.is_active).cloned())
    }

    async fn examples(&self, dataset_id: i64) -> Result<Vec<Example>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .examples
            .iter()
            .filter(|(d, _)| *d == dataset_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn add_example(
        &self,
        dataset_id: i64,
        key: &str,
        value: &str,
        category: ExampleCategory,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        let id = state.allocate_id();
        state.examples.push((
            dataset_id,
            Example {
                id,
                key: key.to_string(),
                value: value.to_string(),
                category,
                embedding: None,
            },
        ));
        Ok(id)
    }

    async fn set_example_embedding(&self, example_id: i64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let (_, example) = state
            .examples
            .iter_mut()
            .find(|(_, e)| e.id == example_id)
            .ok_or_else(|| StoreError::NotFound(format!("example {example_id}")))?;
        example.embedding = Some(embedding);
        Ok(())
    }

    async fn examples_missing_embedding(&self) -> Result<Vec<Example>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .examples
            .iter()
            .filter(|(_, e)| e.embedding.is_none())
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn feedback_turns(&self, dataset_id: i64) -> Result<Vec<FeedbackTurn>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.dataset_id == dataset_id && r.correct == Some(true) && !r.query.is_empty())
            .map(|r| FeedbackTurn {
                id: r.id,
                question: r.question.clone(),
                answer: r.query.clone(),
                embedding: r.question_embedding.clone(),
            })
            .collect())
    }

    async fn session_history(&self, session_id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.read().await;
        let session: Vec<&ChatMessage> = state
            .messages
            .iter()
            .filter(|m| &m.session_id == session_id)
            .collect();
        let skip = session.len().saturating_sub(limit);
        Ok(session.into_iter().skip(skip).cloned().collect())
    }

    async fn append_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        self.state.write().await.messages.extend(messages);
        Ok(())
    }

    async fn append_record(&self, mut record: ChatRecord) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        record.id = state.allocate_id();
        let id = record.id;
        state.records.push(record);
        Ok(id)
    }

    async fn chat_record(&self, id: i64) -> Result<Option<ChatRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn set_feedback(&self, chat_id: i64, correct: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == chat_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat record {chat_id}")))?;
        record.correct = Some(correct);
        Ok(())
    }

    async fn set_record_embedding(&self, chat_id: i64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == chat_id)
            .ok_or_else(|| StoreError::NotFound(format!("chat record {chat_id}")))?;
        record.question_embedding = Some(embedding);
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, StoreError> {
        let mut state = self.state.write().await;
        let messages_before = state.messages.len();
        let records_before = state.records.len();
        state.messages.retain(|m| m.created_at >= cutoff);
        state.records.retain(|r| r.completed_at >= cutoff);
        Ok(PurgeCounts {
            messages: (messages_before - state.messages.len()) as u64,
            records: (records_before - state.records.len()) as u64,
        })
    }
}
