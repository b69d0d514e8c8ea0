use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one worker agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Base URL of the hub, e.g. `http://127.0.0.1:7400`.
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_agent_type() -> String {
    "text_processor".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:7400".to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

impl AgentConfig {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            agent_type: default_agent_type(),
            version: default_version(),
            orchestrator_url: default_orchestrator_url(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }

    pub fn with_orchestrator_url(mut self, url: impl Into<String>) -> Self {
        self.orchestrator_url = url.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        // A zero period would make tokio's interval panic.
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}
