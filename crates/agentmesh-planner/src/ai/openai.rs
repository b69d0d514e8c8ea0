use super::AiClient;
use crate::config::{AiProvider, ModelConfig};
use agentmesh_core::{MeshError, MeshResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible chat completions client.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiClient {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> MeshResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MeshError::Ai(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        if matches!(self.config.provider, AiProvider::OpenRouter) {
            request.header("X-Title", "AgentMesh")
        } else {
            request
        }
    }
}

#[async_trait]
impl AiClient for OpenAiClient {
    async fn call_ai(&self, system_prompt: &str, user_prompt: &str) -> MeshResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });

        debug!(model = %self.config.model_id, url = %url, "Calling completion API");

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| MeshError::Ai(format!("request failed: {e}")))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MeshError::Ai(format!("invalid response body: {e}")))?;

        if !status.is_success() {
            return Err(MeshError::Ai(format!(
                "completion API error {status}: {resp_body}"
            )));
        }

        parse_completion(&resp_body)
    }
}

/// Pulls the first choice's message content out of a chat completions body.
pub fn parse_completion(body: &serde_json::Value) -> MeshResult<String> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .trim();
    if content.is_empty() {
        return Err(MeshError::Ai("completion response had no content".into()));
    }
    Ok(content.to_string())
}
