//! Retention cleanup of chat history and analytics rows.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use querysmith_core::{DatasetStore, PurgeCounts, Result};
use std::sync::Arc;
use tracing::info;

use crate::scheduler::Job;

/// Deletes messages and chat records older than `keep_days`.
pub struct RetentionJob {
    store: Arc<dyn DatasetStore>,
    keep_days: u32,
}

impl RetentionJob {
    pub fn new(store: Arc<dyn DatasetStore>, keep_days: u32) -> Self {
        Self { store, keep_days }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.keep_days))
    }

    /// Purge everything created before `cutoff(now)`.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<PurgeCounts> {
        let cutoff = self.cutoff(now);
        let counts = self.store.purge_before(cutoff).await?;
        info!(
            store = self.store.name(),
            %cutoff,
            messages = counts.messages,
            records = counts.records,
            "Retention cleanup finished"
        );
        Ok(counts)
    }
}

#[async_trait]
impl Job for RetentionJob {
    fn name(&self) -> &str {
        "retention"
    }

    async fn run(&self) -> Result<()> {
        self.purge(Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querysmith_core::{ChatMessage, ChatRecord, SessionId, UsageAccount};
    use querysmith_store::InMemoryStore;

    fn record(question: &str, when: DateTime<Utc>) -> ChatRecord {
        ChatRecord {
            id: 0,
            dataset_id: 1,
            model_id: 1,
            session_id: SessionId::parse("s1").unwrap(),
            question: question.into(),
            answer: "{}".into(),
            query: "{}".into(),
            usage: UsageAccount::default(),
            correct: None,
            cached: false,
            started_at: when,
            completed_at: when,
            question_embedding: None,
        }
    }

    fn message(content: &str, when: DateTime<Utc>) -> ChatMessage {
        let mut msg = ChatMessage::human(SessionId::parse("s1").unwrap(), content);
        msg.created_at = when;
        msg
    }

    #[tokio::test]
    async fn purges_only_rows_older_than_keep_days() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store.append_record(record("old", now - Duration::days(40))).await.unwrap();
        store.append_record(record("recent", now - Duration::days(2))).await.unwrap();
        store
            .append_messages(vec![
                message("old", now - Duration::days(31)),
                message("recent", now - Duration::hours(1)),
            ])
            .await
            .unwrap();

        let job = RetentionJob::new(store.clone(), 30);
        let counts = job.purge(now).await.unwrap();

        assert_eq!(counts, PurgeCounts { messages: 1, records: 1 });
        let remaining = store.records().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].question, "recent");
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn runs_as_a_scheduled_job() {
        let store = Arc::new(InMemoryStore::new());
        store
            .append_record(record("ancient", Utc::now() - Duration::days(400)))
            .await
            .unwrap();

        let job = RetentionJob::new(store.clone(), 30);
        assert_eq!(job.name(), "retention");
        job.run().await.unwrap();
        assert!(store.records().await.is_empty());
    }

    #[test]
    fn cutoff_subtracts_whole_days() {
        let job = RetentionJob::new(Arc::new(InMemoryStore::new()), 7);
        let now = Utc::now();
        assert_eq!(now - job.cutoff(now), Duration::days(7));
    }
}
