use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Interval agents are expected to heartbeat at.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Missed heartbeats after which an agent is marked unhealthy.
    #[serde(default = "default_missed_heartbeats")]
    pub missed_heartbeats: u32,
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7400".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_missed_heartbeats() -> u32 {
    3
}

fn default_dispatch_timeout_secs() -> u64 {
    60
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            missed_heartbeats: default_missed_heartbeats(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

impl HubConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Silence after which an agent counts as stale.
    pub fn max_silence(&self) -> Duration {
        self.heartbeat_interval() * self.missed_heartbeats.max(1)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}
