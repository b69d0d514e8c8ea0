use crate::registry::AgentRegistry;
use agentmesh_core::HealthStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Marks agents unhealthy once they have been silent longer than
/// `max_silence`. Checks every `check_every` until `shutdown` fires.
pub fn spawn_heartbeat_monitor(
    registry: Arc<AgentRegistry>,
    check_every: Duration,
    max_silence: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    sweep(&registry, max_silence).await;
                }
            }
        }
    })
}

/// Returns the ids newly marked unhealthy.
pub async fn sweep(registry: &AgentRegistry, max_silence: Duration) -> Vec<String> {
    let mut marked = Vec::new();
    for record in registry.stale_agents(max_silence).await {
        if record.status == HealthStatus::Unhealthy {
            continue;
        }
        warn!(
            agent_id = %record.agent_id,
            last_heartbeat = %record.last_heartbeat,
            "Agent missed heartbeats, marking unhealthy"
        );
        registry.mark_unhealthy(&record.agent_id).await;
        marked.push(record.agent_id);
    }
    marked
}
