use thiserror::Error;

/// A convenience `Result` alias using [`MeshError`].
pub type MeshResult<T> = Result<T, MeshError>;

/// Top-level error type for AgentMesh.
///
/// Variants group failures by kind: collaborator failures (`Ai`, `Store`,
/// `Http`), local validation and state-machine violations, and agent
/// protocol failures.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The text-completion collaborator failed.
    #[error("AI error: {0}")]
    Ai(String),

    /// The plan repository failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Malformed construction: empty name, unknown dependency, bad plan JSON.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An operation was attempted from the wrong lifecycle state.
    #[error("State error: {0}")]
    State(String),

    /// Agent protocol failure (registration, session, conversation).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The addressed agent, plan, or session does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A peer did not answer in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// Whether the error is a state-machine violation.
    pub fn is_state(&self) -> bool {
        matches!(self, MeshError::State(_))
    }

    /// Whether the error is a validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, MeshError::Validation(_))
    }
}
