//! Agent hub for AgentMesh.
//!
//! Worker agents register here, heartbeat here, and keep one conversation
//! socket open over which the hub dispatches instructions and collects
//! completions.

/// Hub configuration.
pub mod config;
/// Instruction dispatch and completion correlation.
pub mod conversation;
/// Heartbeat staleness monitor.
pub mod monitor;
/// Registered agents and their sessions.
pub mod registry;
/// HTTP and WebSocket surface.
pub mod server;

pub use config::HubConfig;
pub use conversation::ConversationHub;
pub use registry::{format_agent_context, AgentRecord, AgentRegistry};
pub use server::{HubServer, HubState};
