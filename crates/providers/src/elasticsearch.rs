//! Elasticsearch query engine over the REST API.
//!
//! Queries are search request bodies (JSON). Validation runs the
//! `_validate/query` API and, for requests with aggregations, a zero-size
//! dry-run search so that bad field references surface before execution.

use async_trait::async_trait;
use querysmith_core::provider::{ConnectionHandle, QueryEngineProvider, Validation};
use querysmith_core::{ConnectionInfo, OutputShape, QueryEngineError};
use serde_json::{Value, json};
use tracing::debug;

use crate::upstream;

pub struct ElasticsearchProvider {
    client: reqwest::Client,
}

impl Default for ElasticsearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ElasticsearchProvider {
    pub fn new() -> Self {
        Self {
            client: upstream::http_client(60),
        }
    }

    fn request(&self, method: reqwest::Method, conn: &ConnectionInfo, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", conn.url.trim_end_matches('/'), path.trim_start_matches('/'));
        let builder = self.client.request(method, url);
        match &conn.username {
            Some(user) => builder.basic_auth(user, conn.password.as_deref()),
            None => builder,
        }
    }

    /// Send and split failures: transport and auth problems are connection
    /// failures, anything else comes back as `(status, body)`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(u16, Value), QueryEngineError> {
        let response = builder
            .send()
            .await
            .map_err(|e| QueryEngineError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(QueryEngineError::Connection(format!(
                "authentication failed (status {status})"
            )));
        }
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }
}

fn index_path(dataset_refs: &[String]) -> String {
    let indices: Vec<&str> = dataset_refs
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect();
    if indices.is_empty() {
        "_all".into()
    } else {
        indices.join(",")
    }
}

/// The most specific error text in an Elasticsearch error body.
fn error_reason(body: &Value) -> String {
    let error = &body["error"];
    error["root_cause"][0]["reason"]
        .as_str()
        .or_else(|| error["reason"].as_str())
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Flatten a `_mapping` response into `index.field: type` lines.
fn render_mapping(mapping: &Value) -> Option<String> {
    fn walk(prefix: &str, properties: &serde_json::Map<String, Value>, out: &mut Vec<String>) {
        for (name, def) in properties {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            if let Some(kind) = def["type"].as_str() {
                out.push(format!("  {path}: {kind}"));
            }
            if let Some(nested) = def["properties"].as_object() {
                walk(&path, nested, out);
            }
        }
    }

    let indices = mapping.as_object()?;
    let mut lines = Vec::new();
    for (index, body) in indices {
        let Some(properties) = body["mappings"]["properties"].as_object() else {
            continue;
        };
        lines.push(format!("index {index}:"));
        walk("", properties, &mut lines);
    }
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

fn lower_size(mut query: Value, max_rows: u64) -> Result<Value, String> {
    let object = query
        .as_object_mut()
        .ok_or_else(|| "Query must be a JSON object".to_string())?;
    let Some(raw) = object.get("size") else {
        return Ok(query);
    };
    // Elasticsearch coerces floats and numeric strings
    let size = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| format!("\"size\" must be a number, got {raw}"))?;
    if size < 0.0 {
        return Err(format!("\"size\" must not be negative, got {raw}"));
    }
    if size > max_rows as f64 {
        object.insert("size".into(), json!(max_rows));
    }
    Ok(query)
}

#[async_trait]
impl QueryEngineProvider for ElasticsearchProvider {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    fn output_shape(&self) -> OutputShape {
        OutputShape::Json
    }

    async fn connect(&self, conn: &ConnectionInfo) -> Result<ConnectionHandle, QueryEngineError> {
        let (status, body) = self.send(self.request(reqwest::Method::GET, conn, "/")).await?;
        if status != 200 {
            return Err(QueryEngineError::Connection(format!(
                "cluster returned status {status}: {}",
                error_reason(&body)
            )));
        }
        Ok(ConnectionHandle {
            engine: "elasticsearch".into(),
            server_version: body["version"]["number"].as_str().map(str::to_string),
        })
    }

    async fn validate_query(
        &self,
        conn: &ConnectionInfo,
        dataset_refs: &[String],
        query: &str,
    ) -> Result<Validation, QueryEngineError> {
        let parsed: Value = match serde_json::from_str(query) {
            Ok(v) => v,
            Err(e) => return Ok(Validation::rejected(format!("Query is not valid JSON: {e}"))),
        };
        let index = index_path(dataset_refs);

        let clause = parsed.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
        let (status, body) = self
            .send(
                self.request(reqwest::Method::POST, conn, &format!("{index}/_validate/query?explain=true"))
                    .json(&json!({ "query": clause })),
            )
            .await?;
        if status != 200 {
            return Ok(Validation::rejected(error_reason(&body)));
        }
        if body["valid"].as_bool() != Some(true) {
            let reason = body["explanations"]
                .as_array()
                .and_then(|e| e.iter().find_map(|x| x["error"].as_str()))
                .or_else(|| body["error"].as_str())
                .unwrap_or("query clause is not valid")
                .to_string();
            return Ok(Validation::rejected(reason));
        }

        if parsed.get("aggs").is_some() || parsed.get("aggregations").is_some() {
            let mut dry_run = parsed;
            dry_run["size"] = json!(0);
            let (status, body) = self
                .send(
                    self.request(reqwest::Method::POST, conn, &format!("{index}/_search?timeout=10s"))
                        .json(&dry_run),
                )
                .await?;
            if status != 200 {
                return Ok(Validation::rejected(error_reason(&body)));
            }
        }

        debug!(index = %index, "Query validated");
        Ok(Validation::accepted())
    }

    async fn execute(
        &self,
        conn: &ConnectionInfo,
        dataset_refs: &[String],
        query: &str,
    ) -> Result<Value, QueryEngineError> {
        let parsed: Value = serde_json::from_str(query)
            .map_err(|e| QueryEngineError::Execution(format!("Query is not valid JSON: {e}")))?;
        let index = index_path(dataset_refs);
        let (status, body) = self
            .send(self.request(reqwest::Method::POST, conn, &format!("{index}/_search")).json(&parsed))
            .await?;
        if status != 200 {
            return Err(QueryEngineError::Execution(error_reason(&body)));
        }

        let hits: Vec<Value> = body["hits"]["hits"]
            .as_array()
            .map(|hits| hits.iter().map(|h| h["_source"].clone()).collect())
            .unwrap_or_default();
        let mut result = json!({
            "total": body["hits"]["total"]["value"].clone(),
            "hits": hits,
        });
        if let Some(aggs) = body.get("aggregations") {
            result["aggregations"] = aggs.clone();
        }
        Ok(result)
    }

    async fn describe_schema(
        &self,
        dataset_refs: &[String],
        conn: &ConnectionInfo,
    ) -> Result<Option<String>, QueryEngineError> {
        let index = index_path(dataset_refs);
        let (status, body) = self
            .send(self.request(reqwest::Method::GET, conn, &format!("{index}/_mapping")))
            .await?;
        match status {
            200 => Ok(render_mapping(&body)),
            404 => Ok(None),
            other => Err(QueryEngineError::Execution(format!(
                "mapping request returned status {other}: {}",
                error_reason(&body)
            ))),
        }
    }

    fn clamp_result_size(&self, query: &str, max_rows: u64) -> Result<String, String> {
        let parsed: Value = serde_json::from_str(query).map_err(|e| format!("Query is not valid JSON: {e}"))?;
        let clamped = lower_size(parsed, max_rows)?;
        serde_json::to_string_pretty(&clamped).map_err(|e| e.to_string())
    }
}
