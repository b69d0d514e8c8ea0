use serde::{Deserialize, Serialize};

/// Which OpenAI-compatible endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
    /// A local Ollama server exposing the OpenAI-compatible API.
    Ollama,
}

/// Settings for the text-completion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: AiProvider,
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    60
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                AiProvider::OpenAi => "https://api.openai.com",
                AiProvider::OpenRouter => "https://openrouter.ai/api",
                AiProvider::Groq => "https://api.groq.com/openai",
                AiProvider::Ollama => "http://localhost:11434",
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: ModelConfig = from_json(
            r#"{"provider":"groq","model_id":"llama-3.1-8b-instant","api_base_url":null}"#,
        );
        assert_eq!(config.provider, AiProvider::Groq);
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.timeout_secs, 60);
        assert!(config.api_key.is_empty());
        assert_eq!(config.base_url(), "https://api.groq.com/openai");
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let mut config: ModelConfig =
            from_json(r#"{"provider":"openai","model_id":"gpt-4o-mini","api_base_url":null}"#);
        config.api_base_url = Some("http://127.0.0.1:9999/".to_string());
        assert_eq!(config.base_url(), "http://127.0.0.1:9999");
    }

    fn from_json(json: &str) -> ModelConfig {
        serde_json::from_str(json).unwrap()
    }
}
