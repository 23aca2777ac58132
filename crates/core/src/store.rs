//! Storage trait: configuration, examples, history and analytics.
//!
//! Implementations: SQLite and in-memory (for testing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{ChatMessage, ChatRecord, SessionId};
use crate::dataset::{ConnectionInfo, DatasetConfig, Example, ExampleCategory, FeedbackTurn, ModelConfig};
use crate::error::StoreError;

/// Rows removed by a retention purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub messages: u64,
    pub records: u64,
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    async fn dataset_by_name(&self, name: &str) -> Result<Option<DatasetConfig>, StoreError>;

    async fn connection(&self, id: i64) -> Result<Option<ConnectionInfo>, StoreError>;

    /// The generation model questions are answered with.
    async fn active_model(&self) -> Result<Option<ModelConfig>, StoreError>;

    /// All examples of a dataset in stored order.
    async fn examples(&self, dataset_id: i64) -> Result<Vec<Example>, StoreError>;

    async fn add_example(
        &self,
        dataset_id: i64,
        key: &str,
        value: &str,
        category: ExampleCategory,
    ) -> Result<i64, StoreError>;

    async fn set_example_embedding(&self, example_id: i64, embedding: Vec<f32>) -> Result<(), StoreError>;

    /// Examples across every dataset that have no embedding yet.
    async fn examples_missing_embedding(&self) -> Result<Vec<Example>, StoreError>;

    /// Prior turns of `dataset_id` that a reviewer marked correct.
    async fn feedback_turns(&self, dataset_id: i64) -> Result<Vec<FeedbackTurn>, StoreError>;

    /// The last `limit` messages of a session, oldest first.
    async fn session_history(&self, session_id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>, StoreError>;

    async fn append_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError>;

    /// Store an analytics row and return its assigned id.
    async fn append_record(&self, record: ChatRecord) -> Result<i64, StoreError>;

    async fn chat_record(&self, id: i64) -> Result<Option<ChatRecord>, StoreError>;

    /// Record a reviewer verdict. Fails with `NotFound` for unknown ids.
    async fn set_feedback(&self, chat_id: i64, correct: bool) -> Result<(), StoreError>;

    async fn set_record_embedding(&self, chat_id: i64, embedding: Vec<f32>) -> Result<(), StoreError>;

    /// Delete messages and records created before `cutoff`.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, StoreError>;
}
