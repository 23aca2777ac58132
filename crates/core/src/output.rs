//! Extraction of the structured part of a model response.
//!
//! Models wrap queries in markdown fences, prepend chatter, or append
//! explanations. [`extract`] strips that down to the payload for a declared
//! [`OutputShape`]; an empty result means nothing usable was found.

use serde::{Deserialize, Serialize};

/// What a query engine expects the model to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    /// A JSON document (search DSL).
    Json,
    /// A single SQL statement.
    Sql,
    /// Free text.
    Text,
}

/// Strip fencing and format markers for `shape`.
pub fn extract(text: &str, shape: OutputShape) -> String {
    let body = strip_fence(text.trim());
    match shape {
        OutputShape::Json => extract_json(body),
        OutputShape::Sql => body.trim().trim_end_matches(';').trim().to_string(),
        OutputShape::Text => body.trim().to_string(),
    }
}

/// Return the contents of the first fenced block, or the input unchanged.
fn strip_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_ticks = &text[open + 3..];
    // skip the language tag on the opening line
    let content_start = after_ticks.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_ticks[content_start..];
    match content.find("```") {
        Some(close) => &content[..close],
        None => content,
    }
}

/// The outermost `{ ... }` span, if any.
fn extract_json(text: &str) -> String {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => String::new(),
    }
}
