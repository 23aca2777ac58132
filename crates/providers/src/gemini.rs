//! Gemini-class generation model over the Generative Language REST API.

use async_trait::async_trait;
use querysmith_core::provider::{Generation, GenerationModelProvider, SettingSpec};
use querysmith_core::{Error, GenerationError, NanoUsd, UsageAccount};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::pricing::ModelPricing;
use crate::upstream::{self, classify, send_error, setting};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    embedding_model: Option<String>,
    temperature: f32,
    pricing: ModelPricing,
    settings: HashMap<String, String>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(settings: &HashMap<String, String>) -> Self {
        let model = setting(settings, "model").unwrap_or_default();
        Self {
            base_url: setting(settings, "base_url")
                .unwrap_or_else(|| GEMINI_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key: setting(settings, "api_key").unwrap_or_default(),
            pricing: ModelPricing::resolve(&model, settings),
            model,
            embedding_model: setting(settings, "embedding_model"),
            temperature: setting(settings, "temperature")
                .and_then(|t| t.parse().ok())
                .unwrap_or(0.0),
            settings: settings.clone(),
            client: upstream::http_client(120),
        }
    }

    pub fn settings_template() -> Vec<SettingSpec> {
        vec![
            SettingSpec { key: "api_key", required: true, description: "Google AI Studio API key" },
            SettingSpec { key: "model", required: true, description: "Model, e.g. gemini-1.5-flash" },
            SettingSpec { key: "base_url", required: false, description: "API base URL" },
            SettingSpec { key: "embedding_model", required: false, description: "Embedding model, e.g. text-embedding-004" },
            SettingSpec { key: "temperature", required: false, description: "Sampling temperature (default 0)" },
        ]
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = "gemini", status, body = %error_body, "Provider returned error");
            return Err(classify(status, &error_body));
        }
        Ok(response)
    }
}

/// Pull the reply text out of a response, mapping safety blocks to
/// `ContentPolicy`.
fn reply_text(response: GenerateResponse) -> Result<(String, u64, u64), GenerationError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::ContentPolicy(format!("prompt blocked: {reason}")));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::Upstream {
            status_code: 200,
            message: "No candidates in response".into(),
        })?;
    if matches!(candidate.finish_reason.as_deref(), Some("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")) {
        return Err(GenerationError::ContentPolicy(
            "response blocked by safety filters".into(),
        ));
    }
    let text = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();
    let (input, output) = response
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));
    Ok((text, input, output))
}

#[async_trait]
impl GenerationModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn validate_settings(&self) -> Result<(), Error> {
        upstream::require("gemini", &self.settings, &["api_key", "model"])
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation, GenerationError> {
        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": user_prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        debug!(provider = "gemini", model = %self.model, "Sending generateContent request");
        let response = self.post(&self.url(&self.model, "generateContent"), &body).await?;
        let parsed: GenerateResponse = response.json().await.map_err(|e| GenerationError::Upstream {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let (text, input, output) = reply_text(parsed)?;
        Ok(Generation {
            text,
            usage: UsageAccount::new(input, output, self.cost(input, output)),
        })
    }

    fn cost(&self, input_tokens: u64, output_tokens: u64) -> NanoUsd {
        self.pricing.cost(input_tokens, output_tokens)
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, GenerationError> {
        let Some(model) = &self.embedding_model else {
            return Ok(None);
        };
        let body = serde_json::json!({
            "model": format!("models/{model}"),
            "content": { "parts": [{ "text": text }] },
        });
        let response = self.post(&self.url(model, "embedContent"), &body).await?;
        let parsed: EmbedResponse = response.json().await.map_err(|e| GenerationError::Upstream {
            status_code: 200,
            message: format!("Failed to parse embedding response: {e}"),
        })?;
        Ok(Some(parsed.embedding.values))
    }
}

// --- API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
