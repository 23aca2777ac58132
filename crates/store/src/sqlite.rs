//! SQLite store.
//!
//! One database file holds the catalog (connections, datasets, models,
//! examples), the chat history and the per-turn analytics rows.
//! Timestamps are RFC 3339 UTC strings with fixed precision so they
//! compare correctly as text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use querysmith_config::CatalogConfig;
use querysmith_core::store::{DatasetStore, PurgeCounts};
use querysmith_core::{
    ChatMessage, ChatRecord, ConnectionInfo, DatasetConfig, Example, ExampleCategory, FeedbackTurn,
    ModelConfig, NanoUsd, SessionId, StoreError, UsageAccount,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "connections table",
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            name      TEXT UNIQUE NOT NULL,
            kind      TEXT NOT NULL,
            url       TEXT NOT NULL,
            username  TEXT,
            password  TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "datasets table",
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            name           TEXT UNIQUE NOT NULL,
            connection_id  INTEGER NOT NULL REFERENCES connections(id),
            dataset_refs   TEXT NOT NULL DEFAULT '[]',
            custom_prompt  TEXT,
            business_rules TEXT,
            is_active      INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "models table",
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            name      TEXT UNIQUE NOT NULL,
            kind      TEXT NOT NULL,
            settings  TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "examples table",
        r#"
        CREATE TABLE IF NOT EXISTS examples (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            category   TEXT NOT NULL,
            embedding  BLOB,
            UNIQUE(dataset_id, key)
        )
        "#,
    ),
    (
        "chat_messages table",
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "chat_messages index",
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id)",
    ),
    (
        "chat_records table",
        r#"
        CREATE TABLE IF NOT EXISTS chat_records (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id         INTEGER NOT NULL,
            model_id           INTEGER NOT NULL,
            session_id         TEXT NOT NULL,
            question           TEXT NOT NULL,
            answer             TEXT NOT NULL,
            query              TEXT NOT NULL,
            input_tokens       INTEGER NOT NULL,
            output_tokens      INTEGER NOT NULL,
            total_tokens       INTEGER NOT NULL,
            cost_nanos         INTEGER NOT NULL,
            correct            INTEGER,
            cached             INTEGER NOT NULL DEFAULT 0,
            started_at         TEXT NOT NULL,
            completed_at       TEXT NOT NULL,
            question_embedding BLOB
        )
        "#,
    ),
    (
        "chat_records index",
        "CREATE INDEX IF NOT EXISTS idx_chat_records_dataset ON chat_records(dataset_id, correct)",
    ),
];

/// Rows written by [`SqliteStore::sync_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub connections: usize,
    pub datasets: usize,
    pub models: usize,
    pub examples: usize,
}

/// A SQLite-backed [`DatasetStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // every connection to :memory: is a separate database
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (label, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Upsert the connections, datasets, models and examples declared in
    /// the config file. Existing rows are matched by name.
    pub async fn sync_catalog(&self, catalog: &CatalogConfig) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let mut connection_ids = HashMap::new();
        for conn in &catalog.connections {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO connections (name, kind, url, username, password, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    url = excluded.url,
                    username = excluded.username,
                    password = excluded.password,
                    is_active = excluded.is_active
                RETURNING id
                "#,
            )
            .bind(&conn.name)
            .bind(&conn.kind)
            .bind(&conn.url)
            .bind(&conn.username)
            .bind(&conn.password)
            .bind(conn.active)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("connection '{}': {e}", conn.name)))?;
            connection_ids.insert(conn.name.as_str(), id);
            report.connections += 1;
        }

        for dataset in &catalog.datasets {
            let connection_id = connection_ids.get(dataset.connection.as_str()).copied().ok_or_else(|| {
                StoreError::NotFound(format!(
                    "connection '{}' for dataset '{}'",
                    dataset.connection, dataset.name
                ))
            })?;
            let refs = serde_json::to_string(&dataset.refs).map_err(storage)?;
            let dataset_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO datasets (name, connection_id, dataset_refs, custom_prompt, business_rules, is_active)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(name) DO UPDATE SET
                    connection_id = excluded.connection_id,
                    dataset_refs = excluded.dataset_refs,
                    custom_prompt = excluded.custom_prompt,
                    business_rules = excluded.business_rules,
                    is_active = excluded.is_active
                RETURNING id
                "#,
            )
            .bind(&dataset.name)
            .bind(connection_id)
            .bind(&refs)
            .bind(&dataset.custom_prompt)
            .bind(&dataset.business_rules)
            .bind(dataset.active)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("dataset '{}': {e}", dataset.name)))?;
            report.datasets += 1;

            for example in &dataset.examples {
                let category = ExampleCategory::from_str(&example.category)
                    .map_err(|e| StoreError::Storage(format!("example '{}': {e}", example.question)))?;
                // the embedding is of the question, so it survives a changed answer
                sqlx::query(
                    r#"
                    INSERT INTO examples (dataset_id, key, value, category)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(dataset_id, key) DO UPDATE SET
                        value = excluded.value,
                        category = excluded.category
                    "#,
                )
                .bind(dataset_id)
                .bind(&example.question)
                .bind(&example.query)
                .bind(category.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("example '{}': {e}", example.question)))?;
                report.examples += 1;
            }
        }

        for model in &catalog.models {
            let settings = serde_json::to_string(&model.settings).map_err(storage)?;
            sqlx::query(
                r#"
                INSERT INTO models (name, kind, settings, is_active)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    settings = excluded.settings,
                    is_active = excluded.is_active
                "#,
            )
            .bind(&model.name)
            .bind(&model.kind)
            .bind(&settings)
            .bind(model.active)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("model '{}': {e}", model.name)))?;
            report.models += 1;
        }

        tx.commit().await.map_err(storage)?;
        info!(
            connections = report.connections,
            datasets = report.datasets,
            models = report.models,
            examples = report.examples,
            "Catalog synchronized"
        );
        Ok(report)
    }

    fn row_to_dataset(row: &SqliteRow) -> Result<DatasetConfig, StoreError> {
        let refs: String = row.try_get("dataset_refs").map_err(column("dataset_refs"))?;
        Ok(DatasetConfig {
            id: row.try_get("id").map_err(column("id"))?,
            name: row.try_get("name").map_err(column("name"))?,
            connection_id: row.try_get("connection_id").map_err(column("connection_id"))?,
            dataset_refs: serde_json::from_str(&refs).unwrap_or_default(),
            custom_prompt: row.try_get("custom_prompt").map_err(column("custom_prompt"))?,
            business_rules: row.try_get("business_rules").map_err(column("business_rules"))?,
            is_active: row.try_get("is_active").map_err(column("is_active"))?,
        })
    }

    fn row_to_example(row: &SqliteRow) -> Result<Example, StoreError> {
        let category: String = row.try_get("category").map_err(column("category"))?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding").map_err(column("embedding"))?;
        Ok(Example {
            id: row.try_get("id").map_err(column("id"))?,
            key: row.try_get("key").map_err(column("key"))?,
            value: row.try_get("value").map_err(column("value"))?,
            category: ExampleCategory::from_str(&category).map_err(StoreError::QueryFailed)?,
            embedding: embedding.map(|b| blob_to_embedding(&b)),
        })
    }

    fn row_to_record(row: &SqliteRow) -> Result<ChatRecord, StoreError> {
        let session: String = row.try_get("session_id").map_err(column("session_id"))?;
        let started: String = row.try_get("started_at").map_err(column("started_at"))?;
        let completed: String = row.try_get("completed_at").map_err(column("completed_at"))?;
        let embedding: Option<Vec<u8>> = row.try_get("question_embedding").map_err(column("question_embedding"))?;
        let input: i64 = row.try_get("input_tokens").map_err(column("input_tokens"))?;
        let output: i64 = row.try_get("output_tokens").map_err(column("output_tokens"))?;
        let total: i64 = row.try_get("total_tokens").map_err(column("total_tokens"))?;
        let cost: i64 = row.try_get("cost_nanos").map_err(column("cost_nanos"))?;
        Ok(ChatRecord {
            id: row.try_get("id").map_err(column("id"))?,
            dataset_id: row.try_get("dataset_id").map_err(column("dataset_id"))?,
            model_id: row.try_get("model_id").map_err(column("model_id"))?,
            session_id: SessionId::parse(&session)
                .ok_or_else(|| StoreError::QueryFailed("blank session id".into()))?,
            question: row.try_get("question").map_err(column("question"))?,
            answer: row.try_get("answer").map_err(column("answer"))?,
            query: row.try_get("query").map_err(column("query"))?,
            usage: UsageAccount {
                input_tokens: input.max(0) as u64,
                output_tokens: output.max(0) as u64,
                total_tokens: total.max(0) as u64,
                cost: NanoUsd(cost.max(0) as u64),
            },
            correct: row.try_get("correct").map_err(column("correct"))?,
            cached: row.try_get("cached").map_err(column("cached"))?,
            started_at: parse_timestamp(&started),
            completed_at: parse_timestamp(&completed),
            question_embedding: embedding.map(|b| blob_to_embedding(&b)),
        })
    }
}

fn storage(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn column(name: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::QueryFailed(format!("{name} column: {e}"))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Serialize an embedding vector to bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[async_trait]
impl DatasetStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn dataset_by_name(&self, name: &str) -> Result<Option<DatasetConfig>, StoreError> {
        let row = sqlx::query("SELECT * FROM datasets WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("dataset lookup: {e}")))?;
        row.as_ref().map(Self::row_to_dataset).transpose()
    }

    async fn connection(&self, id: i64) -> Result<Option<ConnectionInfo>, StoreError> {
        let row = sqlx::query("SELECT * FROM connections WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("connection lookup: {e}")))?;
        row.map(|r| {
            Ok(ConnectionInfo {
                id: r.try_get("id").map_err(column("id"))?,
                name: r.try_get("name").map_err(column("name"))?,
                kind: r.try_get("kind").map_err(column("kind"))?,
                url: r.try_get("url").map_err(column("url"))?,
                username: r.try_get("username").map_err(column("username"))?,
                password: r.try_get("password").map_err(column("password"))?,
                is_active: r.try_get("is_active").map_err(column("is_active"))?,
            })
        })
        .transpose()
    }

    async fn active_model(&self) -> Result<Option<ModelConfig>, StoreError> {
        let row = sqlx::query("SELECT * FROM models WHERE is_active = 1 ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("model lookup: {e}")))?;
        row.map(|r| {
            let settings: String = r.try_get("settings").map_err(column("settings"))?;
            Ok(ModelConfig {
                id: r.try_get("id").map_err(column("id"))?,
                name: r.try_get("name").map_err(column("name"))?,
                kind: r.try_get("kind").map_err(column("kind"))?,
                settings: serde_json::from_str(&settings).unwrap_or_default(),
                is_active: r.try_get("is_active").map_err(column("is_active"))?,
            })
        })
        .transpose()
    }

    async fn examples(&self, dataset_id: i64) -> Result<Vec<Example>, StoreError> {
        let rows = sqlx::query("SELECT * FROM examples WHERE dataset_id = ?1 ORDER BY id")
            .bind(dataset_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("examples: {e}")))?;
        rows.iter().map(Self::row_to_example).collect()
    }

    async fn add_example(
        &self,
        dataset_id: i64,
        key: &str,
        value: &str,
        category: ExampleCategory,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO examples (dataset_id, key, value, category)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(dataset_id, key) DO UPDATE SET
                value = excluded.value,
                category = excluded.category
            RETURNING id
            "#,
        )
        .bind(dataset_id)
        .bind(key)
        .bind(value)
        .bind(category.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT example failed: {e}")))?;
        debug!(example_id = id, dataset_id, "Stored example");
        Ok(id)
    }

    async fn set_example_embedding(&self, example_id: i64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE examples SET embedding = ?1 WHERE id = ?2")
            .bind(embedding_to_blob(&embedding))
            .bind(example_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE example embedding failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("example {example_id}")));
        }
        Ok(())
    }

    async fn examples_missing_embedding(&self) -> Result<Vec<Example>, StoreError> {
        let rows = sqlx::query("SELECT * FROM examples WHERE embedding IS NULL ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("examples missing embedding: {e}")))?;
        rows.iter().map(Self::row_to_example).collect()
    }

    async fn feedback_turns(&self, dataset_id: i64) -> Result<Vec<FeedbackTurn>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, question, query, question_embedding FROM chat_records
             WHERE dataset_id = ?1 AND correct = 1 AND query <> '' ORDER BY id",
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("feedback turns: {e}")))?;
        rows.iter()
            .map(|r| {
                let embedding: Option<Vec<u8>> =
                    r.try_get("question_embedding").map_err(column("question_embedding"))?;
                Ok(FeedbackTurn {
                    id: r.try_get("id").map_err(column("id"))?,
                    question: r.try_get("question").map_err(column("question"))?,
                    answer: r.try_get("query").map_err(column("query"))?,
                    embedding: embedding.map(|b| blob_to_embedding(&b)),
                })
            })
            .collect()
    }

    async fn session_history(&self, session_id: &SessionId, limit: usize) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM (
                SELECT * FROM chat_messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC",
        )
        .bind(session_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("session history: {e}")))?;
        rows.iter()
            .map(|r| {
                let role: String = r.try_get("role").map_err(column("role"))?;
                let created: String = r.try_get("created_at").map_err(column("created_at"))?;
                Ok(ChatMessage {
                    session_id: session_id.clone(),
                    role: role.parse().map_err(StoreError::QueryFailed)?,
                    content: r.try_get("content").map_err(column("content"))?,
                    created_at: parse_timestamp(&created),
                })
            })
            .collect()
    }

    async fn append_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for message in &messages {
            sqlx::query(
                "INSERT INTO chat_messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(message.session_id.as_str())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(timestamp(message.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn append_record(&self, record: ChatRecord) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_records (
                dataset_id, model_id, session_id, question, answer, query,
                input_tokens, output_tokens, total_tokens, cost_nanos,
                correct, cached, started_at, completed_at, question_embedding
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            RETURNING id
            "#,
        )
        .bind(record.dataset_id)
        .bind(record.model_id)
        .bind(record.session_id.as_str())
        .bind(&record.question)
        .bind(&record.answer)
        .bind(&record.query)
        .bind(i64::try_from(record.usage.input_tokens).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.usage.output_tokens).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.usage.total_tokens).unwrap_or(i64::MAX))
        .bind(i64::try_from(record.usage.cost.0).unwrap_or(i64::MAX))
        .bind(record.correct)
        .bind(record.cached)
        .bind(timestamp(record.started_at))
        .bind(timestamp(record.completed_at))
        .bind(record.question_embedding.as_deref().map(embedding_to_blob))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT chat record failed: {e}")))?;
        Ok(id)
    }

    async fn chat_record(&self, id: i64) -> Result<Option<ChatRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_records WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("chat record: {e}")))?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn set_feedback(&self, chat_id: i64, correct: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE chat_records SET correct = ?1 WHERE id = ?2")
            .bind(correct)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE feedback failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("chat record {chat_id}")));
        }
        Ok(())
    }

    async fn set_record_embedding(&self, chat_id: i64, embedding: Vec<f32>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE chat_records SET question_embedding = ?1 WHERE id = ?2")
            .bind(embedding_to_blob(&embedding))
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE record embedding failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("chat record {chat_id}")));
        }
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<PurgeCounts, StoreError> {
        let cutoff = timestamp(cutoff);
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let messages = sqlx::query("DELETE FROM chat_messages WHERE created_at < ?1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE messages failed: {e}")))?
            .rows_affected();
        let records = sqlx::query("DELETE FROM chat_records WHERE completed_at < ?1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE records failed: {e}")))?
            .rows_affected();
        tx.commit().await.map_err(storage)?;
        Ok(PurgeCounts { messages, records })
    }
}
