//! Stream event type definitions
//!
//! Every piece of agent output that reaches the presentation layer is one of
//! the [`StreamEvent`] variants below, wrapped in a [`SessionEvent`] envelope
//! that carries the owning session id and a per-session sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cost::Cost;
use super::identifiers::{RequestId, SessionId, ToolName};
use super::permissions::PermissionDecision;
use super::session::SessionState;

// ============================================================================
// Event Types
// ============================================================================

/// Classification of an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A line from the agent could not be parsed; the session continues
    Protocol,
    /// The agent itself reported an error (failed turn, API error)
    Agent,
    /// The agent process terminated unexpectedly
    ProcessExit,
    /// The agent process could not be started
    SpawnFailed,
}

impl ErrorKind {
    /// Whether this kind of error moves the session into the `error` state
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::ProcessExit | Self::SpawnFailed)
    }
}

/// Token usage counters reported with a usage update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Input tokens billed
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens billed
    #[serde(default)]
    pub output_tokens: u64,
    /// Input tokens written to the prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Input tokens served from the prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl TokenCounts {
    /// Add another set of counters, saturating
    pub fn accumulate(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(other.cache_creation_input_tokens);
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .saturating_add(other.cache_read_input_tokens);
    }
}

/// A typed event produced by an agent session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text the user sent to the agent
    UserMessage {
        /// Message text
        text: String,
    },
    /// Assistant text; `partial` chunks precede the final one for a block
    AssistantMessage {
        /// Text content (a delta when partial)
        text: String,
        /// Still streaming
        partial: bool,
    },
    /// Model reasoning, same partial-chunk rule as assistant text
    ThinkingMessage {
        /// Thinking content (a delta when partial)
        text: String,
        /// Still streaming
        partial: bool,
    },
    /// The agent wants to run a tool
    ToolCall {
        /// Correlation id shared with the result
        tool_use_id: String,
        /// Tool being invoked
        tool_name: ToolName,
        /// Tool input as sent by the agent
        input: serde_json::Value,
    },
    /// Outcome of a tool invocation
    ToolResult {
        /// Correlation id of the originating call
        tool_use_id: String,
        /// Tool that produced the result, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<ToolName>,
        /// Rendered output
        output: String,
        /// Whether the tool failed or was refused
        is_error: bool,
    },
    /// Informational line from the agent or the core
    SystemNotice {
        /// Notice text
        text: String,
    },
    /// Error report
    Error {
        /// Error classification
        kind: ErrorKind,
        /// Human-readable detail
        detail: String,
    },
    /// Cost and token usage increment
    UsageUpdate {
        /// Cost added by this update
        cost_delta: Cost,
        /// Cumulative cost reported by the agent, if it sent one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost: Option<Cost>,
        /// Token counters
        tokens: TokenCounts,
    },
    /// A tool call is waiting for user approval
    PermissionRequest {
        /// Request id, unique per session
        request_id: RequestId,
        /// Tool awaiting approval
        tool_name: ToolName,
        /// Tool input shown to the user
        preview: serde_json::Value,
        /// Tool invocation the request guards, when the agent names it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
    },
    /// Terminal transition of a permission request
    PermissionResolved {
        /// Request id
        request_id: RequestId,
        /// Final decision
        decision: PermissionDecision,
        /// Decided by policy (bypass, mode, allow-list, force-deny) rather than the user
        automatic: bool,
    },
    /// The current turn finished
    TurnComplete {
        /// Ended by an explicit stop
        #[serde(default)]
        stopped: bool,
    },
}

impl StreamEvent {
    /// Short type name, used in logs
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ThinkingMessage { .. } => "thinking_message",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::SystemNotice { .. } => "system_notice",
            Self::Error { .. } => "error",
            Self::UsageUpdate { .. } => "usage_update",
            Self::PermissionRequest { .. } => "permission_request",
            Self::PermissionResolved { .. } => "permission_resolved",
            Self::TurnComplete { .. } => "turn_complete",
        }
    }

    /// State a session settles in once this event has ended its process
    #[must_use]
    pub const fn settled_state(&self) -> SessionState {
        match self {
            Self::Error { kind, .. } if kind.is_fatal() => SessionState::Error,
            _ => SessionState::Idle,
        }
    }

    /// Shorthand for a protocol error event
    pub fn protocol_error(detail: impl Into<String>) -> Self {
        Self::Error {
            kind: ErrorKind::Protocol,
            detail: detail.into(),
        }
    }

    /// Shorthand for a system notice
    pub fn notice(text: impl Into<String>) -> Self {
        Self::SystemNotice { text: text.into() }
    }
}

/// Envelope delivered on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Owning session
    pub session_id: SessionId,
    /// Gapless, strictly increasing within the session, starting at 0
    pub seq: u64,
    /// When the core emitted the event
    pub timestamp: DateTime<Utc>,
    /// The event itself
    pub event: StreamEvent,
}
