use agentmesh_agent::AgentConfig;
use agentmesh_gateway::HubConfig;
use agentmesh_planner::ModelConfig;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Contents of `agentmesh.toml`. Every table is optional.
#[derive(Debug, Default, Deserialize)]
pub struct MeshConfig {
    /// Completion backend used by `plan`.
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub hub: HubConfig,
    /// Identity used by `worker` unless overridden on the command line.
    pub worker: Option<AgentConfig>,
}

impl MeshConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid agentmesh config")
    }

    /// Reads `path`, or returns the defaults when the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config {}", path.display()))
            }
        }
    }
}
