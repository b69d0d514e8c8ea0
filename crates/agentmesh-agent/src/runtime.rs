use crate::config::AgentConfig;
use crate::processor::InstructionHandler;
use crate::transport::{Conversation, OrchestratorClient};
use agentmesh_core::{
    AgentMessage, HealthStatus, HeartbeatRequest, MeshError, MeshResult, MessageType,
    RegisterRequest, StatusReport, UnregisterRequest,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const SHUTDOWN_REASON: &str = "graceful shutdown";

/// Protocol side of one worker agent.
///
/// [`start`](Self::start) registers with the orchestrator and spawns three
/// tasks against one cancellation token: heartbeat, status, and the
/// conversation loop. [`shutdown`](Self::shutdown) cancels them, waits for
/// them, and unregisters. A runtime is either fully started or stopped; a
/// failed start leaves nothing running.
pub struct AgentRuntime {
    config: AgentConfig,
    client: Arc<dyn OrchestratorClient>,
    handler: Arc<dyn InstructionHandler>,
    session_id: Option<String>,
    registered: bool,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentRuntime {
    pub fn new(
        config: AgentConfig,
        client: Arc<dyn OrchestratorClient>,
        handler: Arc<dyn InstructionHandler>,
    ) -> Self {
        Self {
            config,
            client,
            handler,
            session_id: None,
            registered: false,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Token observed by all agent tasks. It is cancelled when the
    /// conversation ends, and cancelling it stops the tasks without
    /// unregistering; use [`shutdown`](Self::shutdown) for a clean exit.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers, starts heartbeat and status reporting, then opens the
    /// conversation stream and starts serving instructions.
    pub async fn start(&mut self) -> MeshResult<()> {
        if self.registered {
            return Err(MeshError::State(format!(
                "agent {} is already started",
                self.config.agent_id
            )));
        }
        if self.shutdown.is_cancelled() {
            return Err(MeshError::State(format!(
                "agent {} has been shut down",
                self.config.agent_id
            )));
        }

        let request = RegisterRequest {
            agent_id: self.config.agent_id.clone(),
            name: self.config.name.clone(),
            agent_type: self.config.agent_type.clone(),
            capabilities: self.handler.capabilities(),
            version: self.config.version.clone(),
        };
        let response = self.client.register(&request).await?;
        if !response.success {
            error!(agent_id = %self.config.agent_id, reason = %response.message, "Registration rejected");
            return Err(MeshError::Protocol(format!(
                "registration rejected: {}",
                response.message
            )));
        }
        info!(
            agent_id = %self.config.agent_id,
            session_id = %response.session_id,
            capabilities = request.capabilities.len(),
            "Agent registered"
        );
        self.session_id = Some(response.session_id.clone());
        self.registered = true;

        self.tasks.push(tokio::spawn(heartbeat_loop(
            self.client.clone(),
            self.config.clone(),
            response.session_id.clone(),
            self.shutdown.clone(),
        )));
        self.tasks.push(tokio::spawn(status_task(
            self.client.clone(),
            self.config.agent_id.clone(),
            response.session_id,
            self.shutdown.clone(),
        )));

        match self.client.open_conversation(&self.config.agent_id).await {
            Ok(conversation) => {
                self.tasks.push(tokio::spawn(conversation_loop(
                    conversation,
                    self.config.agent_id.clone(),
                    self.handler.clone(),
                    self.shutdown.clone(),
                )));
                Ok(())
            }
            Err(e) => {
                error!(agent_id = %self.config.agent_id, error = %e, "Failed to open conversation");
                self.shutdown().await;
                Err(e)
            }
        }
    }

    /// Stops all tasks and unregisters if registered. Unregister failures
    /// are logged only.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(agent_id = %self.config.agent_id, error = %e, "Agent task ended abnormally");
            }
        }

        if !self.registered {
            return;
        }
        let request = UnregisterRequest {
            agent_id: self.config.agent_id.clone(),
            session_id: self.session_id.clone().unwrap_or_default(),
            reason: SHUTDOWN_REASON.to_string(),
        };
        match self.client.unregister(&request).await {
            Ok(_) => info!(agent_id = %self.config.agent_id, "Agent unregistered"),
            Err(e) => warn!(agent_id = %self.config.agent_id, error = %e, "Unregister failed"),
        }
        self.registered = false;
        self.session_id = None;
    }
}

/// Fires immediately, then once per interval. Failures are logged and the
/// loop carries on.
async fn heartbeat_loop(
    client: Arc<dyn OrchestratorClient>,
    config: AgentConfig,
    session_id: String,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let request = HeartbeatRequest {
                    agent_id: config.agent_id.clone(),
                    session_id: session_id.clone(),
                    status: HealthStatus::Healthy,
                };
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = client.heartbeat(&request) => match result {
                        Ok(_) => debug!(agent_id = %config.agent_id, "Heartbeat sent"),
                        Err(e) => warn!(agent_id = %config.agent_id, error = %e, "Heartbeat failed"),
                    },
                }
            }
        }
    }
    debug!(agent_id = %config.agent_id, "Heartbeat task stopped");
}

/// Reports one initial status, then idles until shutdown.
async fn status_task(
    client: Arc<dyn OrchestratorClient>,
    agent_id: String,
    session_id: String,
    shutdown: CancellationToken,
) {
    let report = StatusReport {
        agent_id: agent_id.clone(),
        session_id,
        status: HealthStatus::Healthy,
    };
    tokio::select! {
        _ = shutdown.cancelled() => return,
        result = client.report_status(&report) => {
            if let Err(e) = result {
                warn!(agent_id = %agent_id, error = %e, "Status report failed");
            }
        }
    }
    shutdown.cancelled().await;
    debug!(agent_id = %agent_id, "Status task stopped");
}

/// Serves one instruction at a time until shutdown or until the stream ends.
async fn conversation_loop(
    mut conversation: Box<dyn Conversation>,
    agent_id: String,
    handler: Arc<dyn InstructionHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = conversation.recv() => match received {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!(agent_id = %agent_id, "Conversation closed by orchestrator");
                    break;
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Conversation stream error");
                    break;
                }
            },
        };

        if message.message_type != MessageType::Instruction {
            debug!(
                agent_id = %agent_id,
                message_type = %message.message_type,
                "Ignoring non-instruction message on conversation"
            );
            continue;
        }

        let reply = answer(&message, &agent_id, handler.as_ref()).await;
        if let Err(e) = conversation.send(&reply).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to send completion");
            break;
        }
    }
    // heartbeat and status stop with the conversation
    shutdown.cancel();
    debug!(agent_id = %agent_id, "Conversation task stopped");
}

async fn answer(
    instruction: &AgentMessage,
    agent_id: &str,
    handler: &dyn InstructionHandler,
) -> AgentMessage {
    info!(
        agent_id = %agent_id,
        correlation_id = %instruction.correlation_id,
        "Instruction received"
    );
    let content = match handler.handle(&instruction.content).await {
        Ok(content) => content,
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Instruction failed");
            format!("Error: {e}")
        }
    };
    instruction.reply(agent_id, content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::processor::TextProcessor;
    use agentmesh_core::{ProtocolAck, RegisterResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-process conversation backed by two channels.
    struct ChannelConversation {
        inbound: mpsc::UnboundedReceiver<AgentMessage>,
        outbound: mpsc::UnboundedSender<AgentMessage>,
    }

    #[async_trait]
    impl Conversation for ChannelConversation {
        async fn recv(&mut self) -> MeshResult<Option<AgentMessage>> {
            Ok(self.inbound.recv().await)
        }

        async fn send(&mut self, message: &AgentMessage) -> MeshResult<()> {
            self.outbound
                .send(message.clone())
                .map_err(|_| MeshError::Protocol("closed".into()))
        }
    }

    #[derive(Default)]
    struct MockClient {
        reject: bool,
        fail_heartbeats: bool,
        fail_conversation: bool,
        heartbeats: AtomicUsize,
        statuses: AtomicUsize,
        unregisters: Mutex<Vec<UnregisterRequest>>,
        conversation: Mutex<Option<ChannelConversation>>,
    }

    #[async_trait]
    impl OrchestratorClient for MockClient {
        async fn register(&self, request: &RegisterRequest) -> MeshResult<RegisterResponse> {
            if self.reject {
                return Ok(RegisterResponse::rejected(format!(
                    "agent {} is not allowed",
                    request.agent_id
                )));
            }
            Ok(RegisterResponse::accepted("session-1"))
        }

        async fn heartbeat(&self, request: &HeartbeatRequest) -> MeshResult<ProtocolAck> {
            assert_eq!(request.session_id, "session-1");
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.fail_heartbeats {
                return Err(MeshError::Http("hub unreachable".into()));
            }
            Ok(ProtocolAck::ok())
        }

        async fn report_status(&self, _report: &StatusReport) -> MeshResult<ProtocolAck> {
            self.statuses.fetch_add(1, Ordering::SeqCst);
            Ok(ProtocolAck::ok())
        }

        async fn unregister(&self, request: &UnregisterRequest) -> MeshResult<ProtocolAck> {
            self.unregisters.lock().unwrap().push(request.clone());
            Ok(ProtocolAck::ok())
        }

        async fn open_conversation(&self, _agent_id: &str) -> MeshResult<Box<dyn Conversation>> {
            if self.fail_conversation {
                return Err(MeshError::Protocol("connection refused".into()));
            }
            let conversation = self
                .conversation
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| MeshError::Protocol("already opened".into()))?;
            Ok(Box::new(conversation))
        }
    }

    struct Harness {
        runtime: AgentRuntime,
        client: Arc<MockClient>,
        to_agent: mpsc::UnboundedSender<AgentMessage>,
        from_agent: mpsc::UnboundedReceiver<AgentMessage>,
    }

    fn harness(client: MockClient, interval: Duration) -> Harness {
        let (to_agent, inbound) = mpsc::unbounded_channel();
        let (outbound, from_agent) = mpsc::unbounded_channel();
        *client.conversation.lock().unwrap() = Some(ChannelConversation { inbound, outbound });
        let client = Arc::new(client);
        let config = AgentConfig::new("text-1", "Text Processor").with_heartbeat_interval(interval);
        let runtime = AgentRuntime::new(config, client.clone(), Arc::new(TextProcessor::new()));
        Harness {
            runtime,
            client,
            to_agent,
            from_agent,
        }
    }

    #[tokio::test]
    async fn test_start_registers_and_reports() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();
        assert!(h.runtime.is_registered());
        assert_eq!(h.runtime.session_id(), Some("session-1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // first heartbeat is immediate
        assert_eq!(h.client.heartbeats.load(Ordering::SeqCst), 1);
        assert_eq!(h.client.statuses.load(Ordering::SeqCst), 1);

        h.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_instruction_gets_correlated_completion() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();

        let instruction = AgentMessage::instruction(
            "orchestrator",
            "text-1",
            "Count the number of words in \"Hello world\"",
        );
        h.to_agent.send(instruction.clone()).unwrap();
        let reply = h.from_agent.recv().await.unwrap();

        assert_eq!(reply.message_type, MessageType::Completion);
        assert_eq!(reply.correlation_id, instruction.correlation_id);
        assert_eq!(reply.from_id, "text-1");
        assert_eq!(reply.to_id, "orchestrator");
        assert_eq!(reply.content, "The text \"Hello world\" contains 2 words.");

        h.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_completions_keep_instruction_order() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();

        let first = AgentMessage::instruction("orchestrator", "text-1", "count words in 'a'");
        let second = AgentMessage::instruction("orchestrator", "text-1", "count words in 'a b'");
        h.to_agent.send(first.clone()).unwrap();
        h.to_agent.send(second.clone()).unwrap();

        assert_eq!(h.from_agent.recv().await.unwrap().correlation_id, first.correlation_id);
        assert_eq!(h.from_agent.recv().await.unwrap().correlation_id, second.correlation_id);
        h.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_instruction_is_ignored() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();

        let heartbeat = AgentMessage::new(
            MessageType::Heartbeat,
            "c-1",
            "orchestrator",
            "text-1",
            "ping",
        );
        h.to_agent.send(heartbeat).unwrap();
        let instruction = AgentMessage::instruction("orchestrator", "text-1", "count words in 'x'");
        h.to_agent.send(instruction.clone()).unwrap();

        let reply = h.from_agent.recv().await.unwrap();
        assert_eq!(reply.correlation_id, instruction.correlation_id);
        h.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_registration_fails_start() {
        let mut h = harness(
            MockClient {
                reject: true,
                ..Default::default()
            },
            Duration::from_secs(30),
        );
        let err = h.runtime.start().await.unwrap_err();
        assert!(err.to_string().contains("agent text-1 is not allowed"));
        assert!(!h.runtime.is_registered());
        assert_eq!(h.client.heartbeats.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conversation_failure_rolls_back() {
        let mut h = harness(
            MockClient {
                fail_conversation: true,
                ..Default::default()
            },
            Duration::from_secs(30),
        );
        assert!(h.runtime.start().await.is_err());
        assert!(!h.runtime.is_registered());
        assert!(h.runtime.shutdown_token().is_cancelled());
        let unregisters = h.client.unregisters.lock().unwrap();
        assert_eq!(unregisters.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_conversation_stops_heartbeats() {
        let mut h = harness(MockClient::default(), Duration::from_millis(10));
        h.runtime.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        drop(h.to_agent);
        tokio::time::timeout(Duration::from_secs(1), h.runtime.shutdown_token().cancelled())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = h.client.heartbeats.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.client.heartbeats.load(Ordering::SeqCst), stopped_at);

        // still registered until shutdown unregisters
        assert!(h.runtime.is_registered());
        h.runtime.shutdown().await;
        assert_eq!(h.client.unregisters.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_completion_send_stops_agent() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();

        drop(h.from_agent);
        let instruction = AgentMessage::instruction("orchestrator", "text-1", "count words in 'a'");
        h.to_agent.send(instruction).unwrap();
        tokio::time::timeout(Duration::from_secs(1), h.runtime.shutdown_token().cancelled())
            .await
            .unwrap();
        h.runtime.shutdown().await;
        assert!(!h.runtime.is_registered());
    }

    #[tokio::test]
    async fn test_shutdown_unregisters_and_stops_heartbeats() {
        let mut h = harness(MockClient::default(), Duration::from_millis(10));
        h.runtime.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        h.runtime.shutdown().await;

        let after_shutdown = h.client.heartbeats.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(h.client.heartbeats.load(Ordering::SeqCst), after_shutdown);

        let unregisters = h.client.unregisters.lock().unwrap();
        assert_eq!(unregisters.len(), 1);
        assert_eq!(unregisters[0].reason, "graceful shutdown");
        assert_eq!(unregisters[0].session_id, "session-1");
        drop(unregisters);
        assert!(!h.runtime.is_registered());
    }

    #[tokio::test]
    async fn test_heartbeat_failures_are_not_fatal() {
        let mut h = harness(
            MockClient {
                fail_heartbeats: true,
                ..Default::default()
            },
            Duration::from_millis(10),
        );
        h.runtime.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(h.client.heartbeats.load(Ordering::SeqCst) >= 3);

        // the conversation keeps working
        let instruction = AgentMessage::instruction("orchestrator", "text-1", "count words in 'x'");
        h.to_agent.send(instruction).unwrap();
        assert!(h.from_agent.recv().await.is_some());
        h.runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut h = harness(MockClient::default(), Duration::from_secs(30));
        h.runtime.start().await.unwrap();
        assert!(h.runtime.start().await.unwrap_err().is_state());
        h.runtime.shutdown().await;
    }
}
