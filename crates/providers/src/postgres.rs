//! PostgreSQL query engine via `sqlx`.
//!
//! Queries are single read-only SQL statements. Validation runs `EXPLAIN`,
//! execution wraps the statement in `json_agg` so rows come back as one
//! JSON array. Pools are cached per connection URL.
//!
//! # Feature gate
//!
//! This module is behind the `postgres` feature flag (on by default).

use async_trait::async_trait;
use querysmith_core::provider::{ConnectionHandle, QueryEngineProvider, Validation};
use querysmith_core::{ConnectionInfo, OutputShape, QueryEngineError};
use regex::Regex;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

static TRAILING_LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blimit\s+(\d+|all)(\s+offset\s+\d+(\s+rows?)?)?\s*$").expect("static regex")
});

static TRAILING_FETCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfetch\s+(?:first|next)\s+(?:(\d+)\s+)?(rows?)\s+(?:only|with\s+ties)\s*$")
        .expect("static regex")
});

pub struct PostgresProvider {
    pools: Mutex<HashMap<String, PgPool>>,
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresProvider {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn pool(&self, conn: &ConnectionInfo) -> Result<PgPool, QueryEngineError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&conn.url) {
            return Ok(pool.clone());
        }

        let mut options = PgConnectOptions::from_str(&conn.url)
            .map_err(|e| QueryEngineError::InvalidSettings(format!("bad connection URL: {e}")))?;
        if let Some(user) = &conn.username {
            options = options.username(user);
        }
        if let Some(password) = &conn.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| QueryEngineError::Connection(format!("PostgreSQL connection failed: {e}")))?;

        info!(connection = %conn.name, "Connected to PostgreSQL");
        pools.insert(conn.url.clone(), pool.clone());
        Ok(pool)
    }
}

/// Database-reported errors belong to the statement; everything else
/// means the server could not be reached.
fn map_sqlx(e: sqlx::Error) -> QueryEngineError {
    match e {
        sqlx::Error::Database(db) => QueryEngineError::Execution(db.message().to_string()),
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => QueryEngineError::Execution(e.to_string()),
        other => QueryEngineError::Connection(other.to_string()),
    }
}

/// Drop comments, surrounding whitespace and trailing semicolons.
fn normalize(query: &str) -> String {
    strip_comments(query)
        .trim()
        .trim_end_matches(';')
        .trim_end()
        .to_string()
}

/// Remove `--` and `/* */` comments outside string literals and quoted
/// identifiers. Block comments nest, as in PostgreSQL.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push(c);
                // a doubled quote closes here and reopens on the next pass
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut depth = 1;
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    match (prev, inner) {
                        ('/', '*') => {
                            depth += 1;
                            prev = '\0';
                        }
                        ('*', '/') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            prev = '\0';
                        }
                        _ => prev = inner,
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Why a statement is not acceptable as a read-only query, if it isn't.
fn read_only_violation(query: &str) -> Option<String> {
    let statement = normalize(query);
    if statement.is_empty() {
        return Some("Query is empty".into());
    }
    if statement.contains(';') {
        return Some("Only a single SQL statement is allowed".into());
    }
    let first = statement
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if first != "select" && first != "with" {
        return Some(format!(
            "Only read-only SELECT statements are allowed, got '{}'",
            first.to_ascii_uppercase()
        ));
    }
    None
}

/// Cap the row count of a normalized statement at `max_rows`.
///
/// A trailing `LIMIT n|ALL` or `FETCH FIRST n ROWS` is lowered in place;
/// otherwise a `LIMIT` is appended.
fn lower_limit(query: &str, max_rows: u64) -> String {
    let statement = normalize(query);
    let count = TRAILING_LIMIT
        .captures(&statement)
        .and_then(|caps| caps.get(1))
        .map(|m| (m.range(), m.as_str()))
        .or_else(|| {
            TRAILING_FETCH.captures(&statement).map(|caps| match caps.get(1) {
                Some(m) => (m.range(), m.as_str()),
                // FETCH FIRST ROW ONLY means one row
                None => {
                    let at = caps.get(2).map_or(statement.len(), |m| m.start());
                    (at..at, "1")
                }
            })
        });

    match count {
        Some((range, current)) => {
            // "ALL" and counts too large for u64 parse as unbounded
            let current: u64 = current.parse().unwrap_or(u64::MAX);
            if current <= max_rows {
                return statement;
            }
            let sep = if range.is_empty() { " " } else { "" };
            format!("{}{max_rows}{sep}{}", &statement[..range.start], &statement[range.end..])
        }
        None => format!("{statement} LIMIT {max_rows}"),
    }
}

/// Wrap a statement so all rows come back as one JSON array.
fn json_agg_wrapper(query: &str) -> String {
    format!("SELECT COALESCE(json_agg(t), '[]'::json) FROM ({}) t", normalize(query))
}

fn render_columns(rows: &[(String, String, String)]) -> Option<String> {
    if rows.is_empty() {
        return None;
    }
    let mut lines = Vec::new();
    let mut current = "";
    for (table, column, data_type) in rows {
        if table != current {
            lines.push(format!("table {table}:"));
            current = table;
        }
        lines.push(format!("  {column}: {data_type}"));
    }
    Some(lines.join("\n"))
}

#[async_trait]
impl QueryEngineProvider for PostgresProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    fn output_shape(&self) -> OutputShape {
        OutputShape::Sql
    }

    async fn connect(&self, conn: &ConnectionInfo) -> Result<ConnectionHandle, QueryEngineError> {
        let pool = self.pool(conn).await?;
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&pool)
            .await
            .map_err(|e| QueryEngineError::Connection(e.to_string()))?;
        Ok(ConnectionHandle {
            engine: "postgres".into(),
            server_version: Some(version),
        })
    }

    async fn validate_query(
        &self,
        conn: &ConnectionInfo,
        _dataset_refs: &[String],
        query: &str,
    ) -> Result<Validation, QueryEngineError> {
        if let Some(reason) = read_only_violation(query) {
            return Ok(Validation::rejected(reason));
        }
        let pool = self.pool(conn).await?;
        let explain = format!("EXPLAIN {}", normalize(query));
        match sqlx::query(&explain).fetch_all(&pool).await.map_err(map_sqlx) {
            Ok(_) => Ok(Validation::accepted()),
            Err(QueryEngineError::Execution(reason)) => {
                debug!(%reason, "EXPLAIN rejected query");
                Ok(Validation::rejected(reason))
            }
            Err(other) => Err(other),
        }
    }

    async fn execute(
        &self,
        conn: &ConnectionInfo,
        _dataset_refs: &[String],
        query: &str,
    ) -> Result<serde_json::Value, QueryEngineError> {
        if let Some(reason) = read_only_violation(query) {
            return Err(QueryEngineError::Execution(reason));
        }
        let pool = self.pool(conn).await?;
        let wrapped = json_agg_wrapper(query);
        let row = sqlx::query(&wrapped).fetch_one(&pool).await.map_err(map_sqlx)?;
        row.try_get::<serde_json::Value, _>(0).map_err(map_sqlx)
    }

    async fn describe_schema(
        &self,
        dataset_refs: &[String],
        conn: &ConnectionInfo,
    ) -> Result<Option<String>, QueryEngineError> {
        let tables: Vec<String> = dataset_refs
            .iter()
            .map(|r| r.trim().rsplit('.').next().unwrap_or_default().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let pool = self.pool(conn).await?;
        let rows = sqlx::query(
            "SELECT table_name::text, column_name::text, data_type::text
             FROM information_schema.columns
             WHERE table_name = ANY($1)
             ORDER BY table_name, ordinal_position",
        )
        .bind(&tables)
        .fetch_all(&pool)
        .await
        .map_err(map_sqlx)?;

        let columns: Vec<(String, String, String)> = rows
            .iter()
            .map(|r| {
                Ok((
                    r.try_get::<String, _>(0)?,
                    r.try_get::<String, _>(1)?,
                    r.try_get::<String, _>(2)?,
                ))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(map_sqlx)?;
        Ok(render_columns(&columns))
    }

    fn clamp_result_size(&self, query: &str, max_rows: u64) -> Result<String, String> {
        if normalize(query).is_empty() {
            return Err("Query is empty".into());
        }
        Ok(lower_limit(query, max_rows))
    }
}
