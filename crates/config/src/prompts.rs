//! Default prompt templates.
//!
//! Templates contain `{NAME}` placeholders. Query-generation templates are
//! expanded by the macro resolver; the user and answer templates also take
//! `{QUESTION}` and `{RESULT}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Query-generation system prompt for Elasticsearch datasets
    #[serde(default = "default_elasticsearch_prompt")]
    pub elasticsearch: String,

    /// Query-generation system prompt for PostgreSQL datasets
    #[serde(default = "default_postgres_prompt")]
    pub postgres: String,

    /// User prompt for query generation
    #[serde(default = "default_user_prompt")]
    pub user: String,

    /// System prompt for the natural-language answer
    #[serde(default = "default_answer_system_prompt")]
    pub answer_system: String,

    /// User prompt for the natural-language answer
    #[serde(default = "default_answer_user_prompt")]
    pub answer_user: String,
}

impl PromptTemplates {
    /// The default query-generation prompt for an engine kind.
    pub fn query_generation(&self, engine_kind: &str) -> Option<&str> {
        match engine_kind {
            "elasticsearch" => Some(&self.elasticsearch),
            "postgres" => Some(&self.postgres),
            _ => None,
        }
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            elasticsearch: default_elasticsearch_prompt(),
            postgres: default_postgres_prompt(),
            user: default_user_prompt(),
            answer_system: default_answer_system_prompt(),
            answer_user: default_answer_user_prompt(),
        }
    }
}

fn default_elasticsearch_prompt() -> String {
    "You are an expert in the {DB_TYPE} query DSL. Write a single search request body \
that answers the user's question against the indices {INDEX_NAMES}.

Index mapping:
{SCHEMA}

Rules:
- Respond with one JSON object and nothing else.
- Use only fields that appear in the mapping.
- Unless the question asks for a specific number of results, set \"size\" to {DEFAULT_ROW_COUNT}. Never exceed {MAX_ROW_COUNT}.
- Use aggregations for counts, sums, averages and rankings; set \"size\" to 0 when only aggregations are needed.
- Today's date is {CURRENT_DATE}. \"Last month\" means {LAST_MONTH_START_END}."
        .into()
}

fn default_postgres_prompt() -> String {
    "You are an expert {DB_TYPE} analyst. Write a single read-only SQL SELECT statement \
that answers the user's question using the tables {TABLE_NAMES}.

Table definitions:
{TABLE_INFO}

Rules:
- Respond with the SQL statement only.
- Use only columns that appear in the table definitions.
- Unless the question asks for a specific number of rows, end with LIMIT {DEFAULT_ROW_COUNT}. Never exceed {MAX_ROW_COUNT}.
- Today's date is {CURRENT_DATE}. \"Last month\" means {LAST_MONTH_START_END}."
        .into()
}

fn default_user_prompt() -> String {
    "Conversation so far:
{CHAT_HISTORY}

Question: {QUESTION}"
        .into()
}

fn default_answer_system_prompt() -> String {
    "You answer questions about data stored in {DB_TYPE}. You are given the user's \
question and the raw result of a query that was run to answer it. Reply in plain, \
concise language. Quote numbers exactly as they appear in the result. If the result \
is empty, say that no matching data was found. Today's date is {CURRENT_DATE}."
        .into()
}

fn default_answer_user_prompt() -> String {
    "Question: {QUESTION}

Query result:
{RESULT}"
        .into()
}
