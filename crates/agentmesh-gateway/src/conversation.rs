use agentmesh_core::{AgentMessage, MeshError, MeshResult, MessageType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Sender id the hub uses on instructions it dispatches.
pub const HUB_ID: &str = "orchestrator";

struct Link {
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<AgentMessage>,
}

struct Pending {
    agent_id: String,
    tx: oneshot::Sender<AgentMessage>,
}

/// Routes instructions to connected agents and completions back to callers.
///
/// Each agent has at most one live conversation. Instructions wait for the
/// completion carrying their correlation id.
pub struct ConversationHub {
    links: RwLock<HashMap<String, Link>>,
    pending: RwLock<HashMap<String, Pending>>,
}

impl ConversationHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a conversation for `agent_id`, replacing any previous one.
    /// Returns the connection id and the stream of messages to write out.
    pub async fn attach(&self, agent_id: &str) -> (Uuid, mpsc::UnboundedReceiver<AgentMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = Uuid::new_v4();
        let replaced = self
            .links
            .write()
            .await
            .insert(agent_id.to_string(), Link { connection_id, tx });
        if replaced.is_some() {
            info!(agent_id = %agent_id, "Conversation replaced by a new connection");
        }
        info!(agent_id = %agent_id, connection_id = %connection_id, "Conversation attached");
        (connection_id, rx)
    }

    /// Detaches the conversation if it is still `connection_id`, failing the
    /// instructions that were waiting on it.
    pub async fn detach(&self, agent_id: &str, connection_id: Uuid) {
        {
            let mut links = self.links.write().await;
            match links.get(agent_id) {
                Some(link) if link.connection_id == connection_id => {
                    links.remove(agent_id);
                }
                _ => return,
            }
        }
        // dropping the senders wakes the waiters with a closed error
        self.pending
            .write()
            .await
            .retain(|_, pending| pending.agent_id != agent_id);
        info!(agent_id = %agent_id, connection_id = %connection_id, "Conversation detached");
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        self.links.read().await.contains_key(agent_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Sends `content` as an instruction to `agent_id` and waits up to
    /// `timeout` for the correlated completion.
    pub async fn dispatch(
        &self,
        agent_id: &str,
        content: &str,
        timeout: Duration,
    ) -> MeshResult<AgentMessage> {
        let instruction = AgentMessage::instruction(HUB_ID, agent_id, content);
        let correlation_id = instruction.correlation_id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.write().await.insert(
            correlation_id.clone(),
            Pending {
                agent_id: agent_id.to_string(),
                tx,
            },
        );

        let sent = match self.links.read().await.get(agent_id) {
            Some(link) => link.tx.send(instruction).is_ok(),
            None => false,
        };
        if !sent {
            self.pending.write().await.remove(&correlation_id);
            return Err(MeshError::Protocol(format!(
                "agent {agent_id} is not connected"
            )));
        }
        info!(agent_id = %agent_id, correlation_id = %correlation_id, "Instruction dispatched");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(completion)) => Ok(completion),
            Ok(Err(_)) => Err(MeshError::Protocol(format!(
                "conversation with agent {agent_id} closed before completion"
            ))),
            Err(_) => {
                self.pending.write().await.remove(&correlation_id);
                warn!(agent_id = %agent_id, correlation_id = %correlation_id, "Instruction timed out");
                Err(MeshError::Timeout(format!(
                    "agent {agent_id} did not answer within {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Handles a message read from `agent_id`'s conversation. Completions
    /// resolve their waiting instruction; anything else is dropped.
    pub async fn deliver(&self, agent_id: &str, message: AgentMessage) {
        if message.message_type != MessageType::Completion {
            warn!(
                agent_id = %agent_id,
                message_type = %message.message_type,
                "Ignoring non-completion message from agent"
            );
            return;
        }
        let pending = self.pending.write().await.remove(&message.correlation_id);
        match pending {
            Some(pending) if pending.agent_id == agent_id => {
                if pending.tx.send(message).is_err() {
                    warn!(agent_id = %agent_id, "Completion arrived after the caller gave up");
                }
            }
            Some(pending) => {
                warn!(
                    agent_id = %agent_id,
                    expected = %pending.agent_id,
                    "Completion from the wrong agent dropped"
                );
                // put it back for the right agent
                self.pending
                    .write()
                    .await
                    .insert(message.correlation_id.clone(), pending);
            }
            None => warn!(
                agent_id = %agent_id,
                correlation_id = %message.correlation_id,
                "No pending instruction for completion"
            ),
        }
    }
}

impl Default for ConversationHub {
    fn default() -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }
}
