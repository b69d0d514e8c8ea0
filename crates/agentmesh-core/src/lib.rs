//! Core types and error definitions for AgentMesh.
//!
//! This crate provides the foundational types shared across all AgentMesh
//! crates: the unified error enum and the wire types of the agent protocol
//! spoken between worker agents and the orchestrator hub.
//!
//! # Main types
//!
//! - [`MeshError`]: Unified error enum for all AgentMesh subsystems.
//! - [`MeshResult`]: Convenience alias for `Result<T, MeshError>`.
//! - [`AgentMessage`]: A typed message on an agent's conversation channel.
//! - [`Capability`]: A capability advertised by a worker agent.
//! - [`RegisterRequest`] / [`RegisterResponse`]: Agent registration handshake.

/// Error types shared by every crate.
pub mod error;
/// Agent protocol wire types (registration, heartbeat, conversation).
pub mod protocol;

pub use error::{MeshError, MeshResult};
pub use protocol::{
    AgentMessage, Capability, HealthStatus, HeartbeatRequest, MessageType, ProtocolAck,
    RegisterRequest, RegisterResponse, StatusReport, UnregisterRequest,
};
