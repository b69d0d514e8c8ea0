//! Worker agent side of the AgentMesh protocol.
//!
//! An agent registers its capabilities with the hub, keeps a heartbeat
//! going, and serves instructions arriving over its conversation stream.
//!
//! # Main types
//!
//! - [`AgentRuntime`]: registration, heartbeat, status, and the conversation loop.
//! - [`OrchestratorClient`] / [`Conversation`]: transport contract, with
//!   [`HttpOrchestratorClient`] for the hub's HTTP and WebSocket surface.
//! - [`InstructionHandler`]: instruction execution, with [`TextProcessor`].

/// Worker configuration.
pub mod config;
/// HTTP and WebSocket transport.
pub mod http;
/// Instruction handlers.
pub mod processor;
/// The agent protocol runtime.
pub mod runtime;
/// Transport contract.
pub mod transport;

pub use config::AgentConfig;
pub use http::HttpOrchestratorClient;
pub use processor::{InstructionHandler, TextProcessor, TextTask};
pub use runtime::AgentRuntime;
pub use transport::{Conversation, OrchestratorClient};
