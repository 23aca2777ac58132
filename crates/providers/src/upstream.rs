//! Mapping of HTTP failures from model APIs onto [`GenerationError`].

use querysmith_core::GenerationError;
use std::collections::HashMap;

/// A transport failure: the request never produced a response.
pub(crate) fn send_error(e: reqwest::Error) -> GenerationError {
    GenerationError::Connection(e.to_string())
}

/// Classify a non-success response body.
///
/// Content-filter and context-length failures get their own kinds so the
/// caller can tell the user what to change; everything else is `Upstream`.
pub(crate) fn classify(status: u16, body: &str) -> GenerationError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let code = error
        .and_then(|e| e["code"].as_str().or_else(|| e["status"].as_str()))
        .unwrap_or_default();
    let message = error
        .and_then(|e| e["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    let lowered = message.to_ascii_lowercase();

    if matches!(code, "content_filter" | "content_policy_violation")
        || lowered.contains("content management policy")
        || lowered.contains("safety")
    {
        return GenerationError::ContentPolicy(message);
    }
    if code == "context_length_exceeded"
        || lowered.contains("maximum context length")
        || lowered.contains("exceeds the maximum number of tokens")
    {
        return GenerationError::ContextOverflow(message);
    }
    if status == 502 || status == 503 || status == 504 {
        return GenerationError::Connection(format!("status {status}: {message}"));
    }
    GenerationError::Upstream {
        status_code: status,
        message,
    }
}

/// Fail with `InvalidProviderSettings` unless every key is present and non-blank.
pub(crate) fn require(
    provider: &str,
    settings: &HashMap<String, String>,
    keys: &[&str],
) -> Result<(), querysmith_core::Error> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| settings.get(*k).is_none_or(|v| v.trim().is_empty()))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(querysmith_core::Error::InvalidProviderSettings(format!(
            "{provider} requires: {}",
            missing.join(", ")
        )))
    }
}

/// Read a non-blank setting.
pub(crate) fn setting(settings: &HashMap<String, String>, key: &str) -> Option<String> {
    settings
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
