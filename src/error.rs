//! Error types for the agent session orchestrator

use thiserror::Error;

/// Main error type for the agent session orchestrator
///
/// Parse-level and process-level failures of a running agent are reported as
/// [`StreamEvent::Error`](crate::types::events::StreamEvent) events instead;
/// this type is what the registry API returns synchronously to its caller.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Agent CLI not found or not installed
    #[error("Agent CLI not found: {0}")]
    CliNotFound(String),

    /// Routing to a session id that does not exist (or was closed)
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// A command omitted its target and no session has focus
    #[error("No session is focused")]
    NoFocusedSession,

    /// The session has no live process to talk to
    #[error("Session {0} has no running agent process")]
    NotRunning(String),

    /// Permission resolution for a request id the session never issued
    #[error("Unknown permission request {request_id} for session {session_id}")]
    UnknownRequest {
        /// Session the request was routed to
        session_id: String,
        /// Request id that was not found
        request_id: String,
    },

    /// Spawning the agent process failed
    #[error("Failed to spawn agent process: {0}")]
    Spawn(String),

    /// Transport layer error (stdin write, stdout read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persistent store error
    #[error("Store error: {0}")]
    Store(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create a CLI not found error
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "Agent CLI not found. Install with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             Or pass an explicit CLI path in OrchestratorOptions"
                .to_string(),
        )
    }

    /// Create an unknown session error
    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        Self::UnknownSession(session_id.into())
    }

    /// Create a not running error
    pub fn not_running(session_id: impl Into<String>) -> Self {
        Self::NotRunning(session_id.into())
    }

    /// Create an unknown request error
    pub fn unknown_request(session_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::UnknownRequest {
            session_id: session_id.into(),
            request_id: request_id.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Stable machine-readable code for bridge replies
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CliNotFound(_) => "cli_not_found",
            Self::UnknownSession(_) => "unknown_session",
            Self::NoFocusedSession => "no_focused_session",
            Self::NotRunning(_) => "not_running",
            Self::UnknownRequest { .. } => "unknown_request",
            Self::Spawn(_) => "spawn",
            Self::Transport(_) => "transport",
            Self::Store(_) => "store",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Timeout(_) => "timeout",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}
