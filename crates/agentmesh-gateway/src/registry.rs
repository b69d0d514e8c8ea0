use agentmesh_core::{
    Capability, HealthStatus, HeartbeatRequest, MeshError, MeshResult, RegisterRequest,
    StatusReport, UnregisterRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// What the hub knows about one registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub name: String,
    pub agent_type: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    /// Never serialized, so listings do not leak sessions.
    #[serde(skip)]
    pub session_id: String,
    pub status: HealthStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentRecord {
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}

/// Registered agents, keyed by agent id.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
}

impl AgentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an agent and issues a fresh session id. Registering an id
    /// that is already known replaces the old session.
    pub async fn register(&self, request: RegisterRequest) -> MeshResult<AgentRecord> {
        if request.agent_id.trim().is_empty() {
            return Err(MeshError::Validation("agent id is empty".into()));
        }
        if request.name.trim().is_empty() {
            return Err(MeshError::Validation(format!(
                "agent {} has an empty name",
                request.agent_id
            )));
        }

        let now = Utc::now();
        let record = AgentRecord {
            agent_id: request.agent_id,
            name: request.name,
            agent_type: request.agent_type,
            version: request.version,
            capabilities: request.capabilities,
            session_id: Uuid::new_v4().to_string(),
            status: HealthStatus::Healthy,
            registered_at: now,
            last_heartbeat: now,
        };

        let previous = self
            .agents
            .write()
            .await
            .insert(record.agent_id.clone(), record.clone());
        if previous.is_some() {
            tracing::info!(agent_id = %record.agent_id, "Agent re-registered, previous session replaced");
        } else {
            tracing::info!(
                agent_id = %record.agent_id,
                capabilities = record.capabilities.len(),
                "Agent registered"
            );
        }
        Ok(record)
    }

    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let record = session_mut(&mut agents, &request.agent_id, &request.session_id)?;
        record.last_heartbeat = Utc::now();
        record.status = request.status;
        Ok(())
    }

    pub async fn report_status(&self, report: &StatusReport) -> MeshResult<()> {
        let mut agents = self.agents.write().await;
        let record = session_mut(&mut agents, &report.agent_id, &report.session_id)?;
        record.status = report.status;
        tracing::debug!(agent_id = %report.agent_id, status = %report.status, "Status reported");
        Ok(())
    }

    pub async fn unregister(&self, request: &UnregisterRequest) -> MeshResult<AgentRecord> {
        let mut agents = self.agents.write().await;
        session_mut(&mut agents, &request.agent_id, &request.session_id)?;
        let record = agents
            .remove(&request.agent_id)
            .ok_or_else(|| MeshError::NotFound(format!("unknown agent {}", request.agent_id)))?;
        tracing::info!(agent_id = %request.agent_id, reason = %request.reason, "Agent unregistered");
        Ok(record)
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// All agents, ordered by id.
    pub async fn list(&self) -> Vec<AgentRecord> {
        let mut records: Vec<_> = self.agents.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        records
    }

    pub async fn find_by_capability(&self, capability: &str) -> Vec<AgentRecord> {
        let mut records: Vec<_> = self
            .agents
            .read()
            .await
            .values()
            .filter(|r| r.has_capability(capability))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        records
    }

    /// Agents whose last heartbeat is older than `max_silence`.
    pub async fn stale_agents(&self, max_silence: Duration) -> Vec<AgentRecord> {
        let Some(cutoff) = chrono::Duration::from_std(max_silence)
            .ok()
            .and_then(|silence| Utc::now().checked_sub_signed(silence))
        else {
            return Vec::new();
        };
        self.agents
            .read()
            .await
            .values()
            .filter(|r| r.last_heartbeat < cutoff)
            .cloned()
            .collect()
    }

    pub async fn mark_unhealthy(&self, agent_id: &str) {
        if let Some(record) = self.agents.write().await.get_mut(agent_id) {
            record.status = HealthStatus::Unhealthy;
        }
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Roster text handed to the decision engine as its agent context.
    pub async fn agent_context(&self) -> String {
        format_agent_context(&self.list().await)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }
}

/// One line per agent: id, type, status, and capabilities.
pub fn format_agent_context(records: &[AgentRecord]) -> String {
    if records.is_empty() {
        return "No agents are currently registered.".to_string();
    }
    records
        .iter()
        .map(|r| {
            let capabilities = r
                .capabilities
                .iter()
                .map(|c| format!("{} ({})", c.name, c.description))
                .collect::<Vec<_>>()
                .join(", ");
            format!("- {} [{}, {}]: {}", r.agent_id, r.agent_type, r.status, capabilities)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn session_mut<'a>(
    agents: &'a mut HashMap<String, AgentRecord>,
    agent_id: &str,
    session_id: &str,
) -> MeshResult<&'a mut AgentRecord> {
    let record = agents
        .get_mut(agent_id)
        .ok_or_else(|| MeshError::NotFound(format!("unknown agent {agent_id}")))?;
    if record.session_id != session_id {
        return Err(MeshError::Protocol(format!(
            "session mismatch for agent {agent_id}"
        )));
    }
    Ok(record)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(id: &str) -> RegisterRequest {
        RegisterRequest {
            agent_id: id.to_string(),
            name: format!("Agent {id}"),
            agent_type: "text_processor".into(),
            capabilities: vec![Capability::new("word_count", "Count words")],
            version: "0.3.0".into(),
        }
    }

    fn heartbeat(id: &str, session: &str) -> HeartbeatRequest {
        HeartbeatRequest {
            agent_id: id.into(),
            session_id: session.into(),
            status: HealthStatus::Degraded,
        }
    }

    #[tokio::test]
    async fn test_register_issues_session() {
        let registry = AgentRegistry::new();
        let record = registry.register(request("a")).await.unwrap();
        assert_eq!(record.session_id.len(), 36);
        assert_eq!(record.status, HealthStatus::Healthy);
        assert!(registry.contains("a").await);
    }

    #[tokio::test]
    async fn test_register_validates() {
        let registry = AgentRegistry::new();
        assert!(registry.register(request(" ")).await.unwrap_err().is_validation());
        let mut nameless = request("a");
        nameless.name = String::new();
        assert!(registry.register(nameless).await.unwrap_err().is_validation());
        assert_eq!(registry.agent_count().await, 0);
    }

    #[tokio::test]
    async fn test_reregister_replaces_session() {
        let registry = AgentRegistry::new();
        let first = registry.register(request("a")).await.unwrap();
        let second = registry.register(request("a")).await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert!(registry.heartbeat(&heartbeat("a", &first.session_id)).await.is_err());
        assert_eq!(registry.agent_count().await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_checks_session() {
        let registry = AgentRegistry::new();
        let record = registry.register(request("a")).await.unwrap();

        let err = registry.heartbeat(&heartbeat("a", "wrong")).await.unwrap_err();
        assert!(err.to_string().contains("session mismatch"));
        let err = registry.heartbeat(&heartbeat("b", "x")).await.unwrap_err();
        assert!(err.to_string().contains("unknown agent b"));

        registry.heartbeat(&heartbeat("a", &record.session_id)).await.unwrap();
        assert_eq!(registry.get("a").await.unwrap().status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_unregister_requires_session() {
        let registry = AgentRegistry::new();
        let record = registry.register(request("a")).await.unwrap();
        let mut unregister = UnregisterRequest {
            agent_id: "a".into(),
            session_id: "wrong".into(),
            reason: "graceful shutdown".into(),
        };
        assert!(registry.unregister(&unregister).await.is_err());
        unregister.session_id = record.session_id;
        registry.unregister(&unregister).await.unwrap();
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_find_by_capability_and_context() {
        let registry = AgentRegistry::new();
        registry.register(request("b")).await.unwrap();
        let mut other = request("a");
        other.capabilities = vec![Capability::new("summarize", "Summarize text")];
        registry.register(other).await.unwrap();

        let found = registry.find_by_capability("word_count").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, "b");

        let context = registry.agent_context().await;
        assert_eq!(
            context,
            "- a [text_processor, healthy]: summarize (Summarize text)\n\
             - b [text_processor, healthy]: word_count (Count words)"
        );
        assert_eq!(
            AgentRegistry::new().agent_context().await,
            "No agents are currently registered."
        );
    }

    #[tokio::test]
    async fn test_stale_agents() {
        let registry = AgentRegistry::new();
        registry.register(request("a")).await.unwrap();
        assert!(registry.stale_agents(Duration::from_secs(60)).await.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stale = registry.stale_agents(Duration::from_millis(5)).await;
        assert_eq!(stale.len(), 1);

        registry.mark_unhealthy("a").await;
        assert_eq!(registry.get("a").await.unwrap().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_listing_hides_session() {
        let record = AgentRecord {
            agent_id: "a".into(),
            name: "A".into(),
            agent_type: "t".into(),
            version: "1".into(),
            capabilities: vec![],
            session_id: "secret".into(),
            status: HealthStatus::Healthy,
            registered_at: Utc::now(),
            last_heartbeat: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("secret"));
    }
}
