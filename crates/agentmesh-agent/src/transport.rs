use agentmesh_core::{
    AgentMessage, HeartbeatRequest, MeshResult, ProtocolAck, RegisterRequest, RegisterResponse,
    StatusReport, UnregisterRequest,
};
use async_trait::async_trait;

/// The agent's view of the orchestrator.
///
/// Registration, heartbeats, status, and unregistration are request/response
/// side-channels. Instructions arrive only over the [`Conversation`] opened
/// with [`OrchestratorClient::open_conversation`].
#[async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn register(&self, request: &RegisterRequest) -> MeshResult<RegisterResponse>;
    async fn heartbeat(&self, request: &HeartbeatRequest) -> MeshResult<ProtocolAck>;
    async fn report_status(&self, report: &StatusReport) -> MeshResult<ProtocolAck>;
    async fn unregister(&self, request: &UnregisterRequest) -> MeshResult<ProtocolAck>;

    /// Opens the duplex conversation stream for `agent_id`. The agent is
    /// identified by the stream's address, not by an in-band message.
    async fn open_conversation(&self, agent_id: &str) -> MeshResult<Box<dyn Conversation>>;
}

/// One agent's duplex instruction/completion stream.
#[async_trait]
pub trait Conversation: Send {
    /// Next message, or `None` once the peer closed the stream.
    async fn recv(&mut self) -> MeshResult<Option<AgentMessage>>;
    async fn send(&mut self, message: &AgentMessage) -> MeshResult<()>;
}
