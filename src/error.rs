//! Error types for the bargaining agent

use thiserror::Error;

/// Main error type for the bargaining agent
#[derive(Error, Debug)]
pub enum AgentError {
    // Oracle errors
    #[error("Reasoning oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    // Decision errors
    #[error(transparent)]
    Decision(#[from] DecisionError),

    // Transport errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Negotiation session closed: {0}")]
    SessionClosed(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("Missing configuration field: {0}")]
    MissingConfig(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Short label used in structured logs to tell retryable failures apart
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::OracleUnavailable(_) | AgentError::Http(_) => "oracle_unavailable",
            AgentError::MalformedResponse(_) | AgentError::Json(_) => "malformed_response",
            AgentError::Decision(_) => "invalid_state",
            AgentError::InvalidRequest(_)
            | AgentError::InvalidPayload(_)
            | AgentError::TaskNotFound(_)
            | AgentError::SessionClosed(_)
            | AgentError::UnsupportedOperation(_)
            | AgentError::Bind { .. } => "transport",
            AgentError::InvalidConfig(_) | AgentError::MissingConfig(_) => "configuration",
            AgentError::Io(_) | AgentError::Internal(_) => "internal",
        }
    }
}

/// Hard failure of a decision request. Only a structurally invalid input
/// state reaches the caller; oracle trouble is absorbed by the fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Invalid negotiation state: {0}")]
    InvalidState(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;
