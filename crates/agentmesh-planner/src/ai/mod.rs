pub mod openai;

use agentmesh_core::MeshResult;
use async_trait::async_trait;

pub use openai::OpenAiClient;

/// Text-completion collaborator used by the decision engine.
///
/// The engine owns prompt construction and response parsing; implementations
/// only turn a system prompt and a user prompt into response text. Any
/// failure is reported as an error, never as an empty response.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn call_ai(&self, system_prompt: &str, user_prompt: &str) -> MeshResult<String>;
}
