use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health reported by an agent on its heartbeat and status side-channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capacity.
    Degraded,
    /// Not able to take work.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A named capability advertised by a worker agent at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name steps are addressed by.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Names of accepted inputs.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of produced outputs.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Capability {
    /// Creates a capability with no declared inputs or outputs.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Sets the declared inputs.
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the declared outputs.
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Sent once by an agent on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Stable agent identifier.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Free-form agent type, e.g. `"text_processor"`.
    pub agent_type: String,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Agent software version.
    pub version: String,
}

/// Reply to a [`RegisterRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Whether the registration was accepted.
    pub success: bool,
    /// Human-readable result, the rejection reason when `success` is false.
    pub message: String,
    /// Session assigned to the agent; empty on rejection.
    #[serde(default)]
    pub session_id: String,
}

impl RegisterResponse {
    /// An accepted registration.
    pub fn accepted(session_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: "registered".to_string(),
            session_id: session_id.into(),
        }
    }

    /// A rejected registration.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            session_id: String::new(),
        }
    }
}

/// Periodic liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub session_id: String,
    pub status: HealthStatus,
}

/// Health report on the status side-channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub agent_id: String,
    pub session_id: String,
    pub status: HealthStatus,
}

/// Sent by an agent when it leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub agent_id: String,
    pub session_id: String,
    pub reason: String,
}

/// Generic acknowledgement for heartbeat, status, and unregister calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolAck {
    /// Whether the request was accepted.
    pub acknowledged: bool,
    /// Optional detail.
    #[serde(default)]
    pub message: String,
}

impl ProtocolAck {
    /// A positive acknowledgement.
    pub fn ok() -> Self {
        Self {
            acknowledged: true,
            message: String::new(),
        }
    }
}

/// Type of an [`AgentMessage`] on the conversation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Work for the agent to carry out.
    Instruction,
    /// The agent's answer to an instruction.
    Completion,
    /// Progress or state notification.
    StatusUpdate,
    /// Liveness ping. Belongs on the heartbeat endpoint, not the conversation.
    Heartbeat,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Instruction => write!(f, "instruction"),
            MessageType::Completion => write!(f, "completion"),
            MessageType::StatusUpdate => write!(f, "status_update"),
            MessageType::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// A single message exchanged on an agent's conversation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique identifier for this message.
    pub message_id: String,
    /// Links an instruction to its completion.
    pub correlation_id: String,
    /// Sender id.
    pub from_id: String,
    /// Recipient id.
    pub to_id: String,
    /// Message type.
    pub message_type: MessageType,
    /// Textual payload.
    pub content: String,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    /// Creates a message with a fresh id.
    pub fn new(
        message_type: MessageType,
        correlation_id: impl Into<String>,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            correlation_id: correlation_id.into(),
            from_id: from_id.into(),
            to_id: to_id.into(),
            message_type,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates an instruction. Its `message_id` doubles as the correlation id.
    pub fn instruction(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(MessageType::Instruction, "", from_id, to_id, content);
        msg.correlation_id = msg.message_id.clone();
        msg
    }

    /// Creates the completion answering this message, sent by `from_id`.
    pub fn reply(&self, from_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            MessageType::Completion,
            self.correlation_id.clone(),
            from_id,
            self.from_id.clone(),
            content,
        )
    }
}
