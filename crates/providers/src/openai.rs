//! OpenAI-class generation model.
//!
//! One client serves both the public OpenAI API and Azure OpenAI
//! deployments; they differ only in URL layout and auth header.
//!
//! Supports:
//! - Chat completions (non-streaming)
//! - Embeddings when an embedding model/deployment is configured

use async_trait::async_trait;
use querysmith_core::provider::{Generation, GenerationModelProvider, SettingSpec};
use querysmith_core::{Error, GenerationError, NanoUsd, UsageAccount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::pricing::ModelPricing;
use crate::upstream::{self, classify, send_error, setting};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Which deployment style the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flavor {
    OpenAi,
    Azure { api_version: String },
}

/// An OpenAI or Azure OpenAI chat-completions client.
pub struct OpenAiProvider {
    name: &'static str,
    flavor: Flavor,
    base_url: String,
    api_key: String,
    /// Model id (OpenAI) or deployment name (Azure)
    model: String,
    embedding_model: Option<String>,
    temperature: f32,
    pricing: ModelPricing,
    settings: HashMap<String, String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn openai(settings: &HashMap<String, String>) -> Self {
        let model = setting(settings, "model").unwrap_or_default();
        Self {
            name: "openai",
            flavor: Flavor::OpenAi,
            base_url: setting(settings, "base_url")
                .unwrap_or_else(|| OPENAI_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            api_key: setting(settings, "api_key").unwrap_or_default(),
            pricing: ModelPricing::resolve(&model, settings),
            model,
            embedding_model: setting(settings, "embedding_model"),
            temperature: read_temperature(settings),
            settings: settings.clone(),
            client: upstream::http_client(120),
        }
    }

    pub fn azure(settings: &HashMap<String, String>) -> Self {
        let deployment = setting(settings, "deployment").unwrap_or_default();
        // Pricing follows the underlying model, not the deployment name.
        let priced_as = setting(settings, "model").unwrap_or_else(|| deployment.clone());
        Self {
            name: "azure_openai",
            flavor: Flavor::Azure {
                api_version: setting(settings, "api_version")
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.into()),
            },
            base_url: setting(settings, "endpoint")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            api_key: setting(settings, "api_key").unwrap_or_default(),
            pricing: ModelPricing::resolve(&priced_as, settings),
            model: deployment,
            embedding_model: setting(settings, "embedding_deployment"),
            temperature: read_temperature(settings),
            settings: settings.clone(),
            client: upstream::http_client(120),
        }
    }

    pub fn openai_settings() -> Vec<SettingSpec> {
        vec![
            SettingSpec { key: "api_key", required: true, description: "OpenAI API key" },
            SettingSpec { key: "model", required: true, description: "Chat model, e.g. gpt-4o-mini" },
            SettingSpec { key: "base_url", required: false, description: "API base URL for compatible gateways" },
            SettingSpec { key: "embedding_model", required: false, description: "Embedding model, e.g. text-embedding-3-small" },
            SettingSpec { key: "temperature", required: false, description: "Sampling temperature (default 0)" },
        ]
    }

    pub fn azure_settings() -> Vec<SettingSpec> {
        vec![
            SettingSpec { key: "api_key", required: true, description: "Azure OpenAI resource key" },
            SettingSpec { key: "endpoint", required: true, description: "Resource endpoint, e.g. https://my-resource.openai.azure.com" },
            SettingSpec { key: "deployment", required: true, description: "Chat deployment name" },
            SettingSpec { key: "api_version", required: false, description: "REST API version (default 2024-06-01)" },
            SettingSpec { key: "model", required: false, description: "Underlying model, used for pricing" },
            SettingSpec { key: "embedding_deployment", required: false, description: "Embedding deployment name" },
            SettingSpec { key: "temperature", required: false, description: "Sampling temperature (default 0)" },
        ]
    }

    fn endpoint(&self, operation: &str, model: &str) -> String {
        match &self.flavor {
            Flavor::OpenAi => format!("{}/{operation}", self.base_url),
            Flavor::Azure { api_version } => format!(
                "{}/openai/deployments/{model}/{operation}?api-version={api_version}",
                self.base_url
            ),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.flavor {
            Flavor::OpenAi => request.header("Authorization", format!("Bearer {}", self.api_key)),
            Flavor::Azure { .. } => request.header("api-key", &self.api_key),
        }
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = self.name, status, body = %error_body, "Provider returned error");
            return Err(classify(status, &error_body));
        }
        Ok(response)
    }
}

fn read_temperature(settings: &HashMap<String, String>) -> f32 {
    setting(settings, "temperature")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}

#[async_trait]
impl GenerationModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn validate_settings(&self) -> Result<(), Error> {
        match self.flavor {
            Flavor::OpenAi => upstream::require(self.name, &self.settings, &["api_key", "model"]),
            Flavor::Azure { .. } => {
                upstream::require(self.name, &self.settings, &["api_key", "endpoint", "deployment"])
            }
        }
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation, GenerationError> {
        let url = self.endpoint("chat/completions", &self.model);
        let mut body = serde_json::json!({
            "messages": [
                ApiMessage { role: "system".into(), content: Some(system_prompt.into()) },
                ApiMessage { role: "user".into(), content: Some(user_prompt.into()) },
            ],
            "temperature": self.temperature,
        });
        if self.flavor == Flavor::OpenAi {
            body["model"] = serde_json::json!(self.model);
        }

        debug!(provider = self.name, model = %self.model, "Sending completion request");
        let response = self.post(&url, &body).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| GenerationError::Upstream {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::Upstream {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(GenerationError::ContentPolicy(
                "completion was stopped by the content filter".into(),
            ));
        }

        let (input, output) = api_response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Generation {
            text: choice.message.content.unwrap_or_default(),
            usage: UsageAccount::new(input, output, self.cost(input, output)),
        })
    }

    fn cost(&self, input_tokens: u64, output_tokens: u64) -> NanoUsd {
        self.pricing.cost(input_tokens, output_tokens)
    }

    async fn embed(&self, text: &str) -> Result<Option<Vec<f32>>, GenerationError> {
        let Some(embedding_model) = &self.embedding_model else {
            return Ok(None);
        };
        let url = self.endpoint("embeddings", embedding_model);
        let mut body = serde_json::json!({
            "input": [text],
            "encoding_format": "float",
        });
        if self.flavor == Flavor::OpenAi {
            body["model"] = serde_json::json!(embedding_model);
        }

        debug!(provider = self.name, model = %embedding_model, "Sending embedding request");
        let response = self.post(&url, &body).await?;

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| GenerationError::Upstream {
            status_code: 200,
            message: format!("Failed to parse embedding response: {e}"),
        })?;

        Ok(api_resp.data.into_iter().next().map(|d| d.embedding))
    }
}

// --- API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn openai_endpoint_layout() {
        let p = OpenAiProvider::openai(&settings(&[("api_key", "sk"), ("model", "gpt-4o")]));
        assert_eq!(p.endpoint("chat/completions", "gpt-4o"), "https://api.openai.com/v1/chat/completions");
        assert!(p.validate_settings().is_ok());
    }

    #[test]
    fn azure_endpoint_layout() {
        let p = OpenAiProvider::azure(&settings(&[
            ("api_key", "k"),
            ("endpoint", "https://res.openai.azure.com/"),
            ("deployment", "gpt4o-prod"),
            ("api_version", "2024-02-01"),
        ]));
        assert_eq!(
            p.endpoint("chat/completions", "gpt4o-prod"),
            "https://res.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn missing_model_fails_validation() {
        let p = OpenAiProvider::openai(&settings(&[("api_key", "sk")]));
        assert!(matches!(p.validate_settings(), Err(Error::InvalidProviderSettings(_))));
    }

    #[test]
    fn azure_prices_by_underlying_model() {
        let p = OpenAiProvider::azure(&settings(&[("deployment", "prod"), ("model", "gpt-4o")]));
        assert_eq!(p.cost(1_000_000, 0), NanoUsd(2_500_000_000));
    }

    #[tokio::test]
    async fn no_embedding_model_means_no_embedding() {
        let p = OpenAiProvider::openai(&settings(&[("api_key", "sk"), ("model", "gpt-4o")]));
        assert_eq!(p.embed("hello").await.unwrap(), None);
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{"model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"{}"},"finish_reason":"stop"}],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }
}
