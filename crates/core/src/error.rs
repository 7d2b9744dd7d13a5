//! Error types for the AgentRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; every error can be
//! classified into an [`ErrorKind`] tag so callers can choose a retry
//! policy without matching on transport details.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all AgentRelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Setup errors ---
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Completion service errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Agent errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Loop errors ---
    #[error("Maximum turns reached ({max_turns}) without a final response")]
    MaxTurnsExceeded { max_turns: u32 },

    #[error("Execution failed: {0}")]
    Execution(String),

    // --- Session errors ---
    #[error("Invalid flow: {0}")]
    InvalidFlow(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Serialized in `SCREAMING_SNAKE_CASE` with an `_ERROR` suffix where the
/// wire name carries one (e.g. `TOOL_ERROR`, `INVALID_FLOW`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "INITIALIZATION_ERROR")]
    Initialization,
    #[serde(rename = "AGENT_ERROR")]
    Agent,
    #[serde(rename = "TOOL_ERROR")]
    Tool,
    #[serde(rename = "EXECUTION_ERROR")]
    Execution,
    #[serde(rename = "INVALID_FLOW")]
    InvalidFlow,
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimit,
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    #[serde(rename = "MODEL_ERROR")]
    Model,
}

impl ErrorKind {
    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "INITIALIZATION_ERROR",
            Self::Agent => "AGENT_ERROR",
            Self::Tool => "TOOL_ERROR",
            Self::Execution => "EXECUTION_ERROR",
            Self::InvalidFlow => "INVALID_FLOW",
            Self::RateLimit => "RATE_LIMIT_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Model => "MODEL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Initialization(_) | Self::Config { .. } => ErrorKind::Initialization,
            Self::Provider(e) => e.kind(),
            Self::Agent(_) => ErrorKind::Agent,
            Self::Tool(_) => ErrorKind::Tool,
            Self::MaxTurnsExceeded { .. } | Self::Execution(_) => ErrorKind::Execution,
            Self::InvalidFlow(_) => ErrorKind::InvalidFlow,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::AuthenticationFailed(_) => ErrorKind::Authentication,
            Self::ModelNotFound(_) => ErrorKind::Model,
            Self::NotConfigured(_) => ErrorKind::Initialization,
            _ => ErrorKind::Execution,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Duplicate agent: {0}")]
    DuplicateAgent(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Duplicate tool: {0}")]
    Duplicate(String),

    #[error("Agent '{agent}' is not permitted to call tool '{tool_name}'")]
    Unauthorized { agent: String, tool_name: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Tool {0} is executed by the completion service")]
    Remote(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
