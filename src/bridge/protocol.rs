//! Bridge wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::SessionError;
use crate::types::events::SessionEvent;
use crate::types::identifiers::{RequestId, SessionId, ToolName};
use crate::types::permissions::{EditMode, PermissionDecision};
use crate::types::session::SessionConfig;

/// Command sent by the presentation layer
///
/// Commands that take an optional `session_id` act on the focused session
/// when it is omitted. A caller-chosen `id` field may accompany any command
/// and is echoed in the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Create a session; it takes focus
    CreateSession {
        /// Session configuration
        #[serde(default)]
        config: Option<SessionConfig>,
    },
    /// Close a session
    CloseSession {
        /// Target session
        session_id: SessionId,
    },
    /// Focus a session
    FocusSession {
        /// Target session
        session_id: SessionId,
    },
    /// Summaries of every session
    ListSessions,
    /// Send a turn
    SendMessage {
        /// Target session, focused when omitted
        #[serde(default)]
        session_id: Option<SessionId>,
        /// Message text
        text: String,
        /// Files the agent should read
        #[serde(default)]
        attachments: Vec<PathBuf>,
    },
    /// Stop a session's process
    StopSession {
        /// Target session, focused when omitted
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    /// Decide a pending permission request
    ResolvePermission {
        /// Session that issued the request
        session_id: SessionId,
        /// Request id from the `permission_request` event
        request_id: RequestId,
        /// Decision
        decision: PermissionDecision,
    },
    /// Change a session's edit mode
    SetEditMode {
        /// Target session, focused when omitted
        #[serde(default)]
        session_id: Option<SessionId>,
        /// New mode
        mode: EditMode,
    },
    /// Toggle global bypass
    SetGlobalBypass {
        /// New state
        enabled: bool,
    },
    /// Add a persistent allow-list rule
    AddAllowRule {
        /// Tool the rule covers
        tool_name: ToolName,
        /// Command glob; the whole tool when omitted
        #[serde(default)]
        pattern: Option<String>,
    },
    /// Every allow-list rule
    ListAllowRules,
}

impl Command {
    /// Wire name of the command
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "create_session",
            Self::CloseSession { .. } => "close_session",
            Self::FocusSession { .. } => "focus_session",
            Self::ListSessions => "list_sessions",
            Self::SendMessage { .. } => "send_message",
            Self::StopSession { .. } => "stop_session",
            Self::ResolvePermission { .. } => "resolve_permission",
            Self::SetEditMode { .. } => "set_edit_mode",
            Self::SetGlobalBypass { .. } => "set_global_bypass",
            Self::AddAllowRule { .. } => "add_allow_rule",
            Self::ListAllowRules => "list_allow_rules",
        }
    }

    /// Whether the command waits on an agent process before it can reply
    #[must_use]
    pub const fn waits_on_session(&self) -> bool {
        matches!(
            self,
            Self::CloseSession { .. } | Self::SendMessage { .. } | Self::StopSession { .. }
        )
    }
}

/// Error half of a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ReplyError {
    /// Reply error for a line that is not a valid command
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_command".to_string(),
            message: message.into(),
        }
    }
}

impl From<&SessionError> for ReplyError {
    fn from(e: &SessionError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// One line written by the bridge
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    /// Answer to a command
    Reply {
        /// Caller id echoed from the command
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        /// Whether the command succeeded
        ok: bool,
        /// Command result when `ok`
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Failure when not `ok`
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ReplyError>,
    },
    /// A session event from the bus
    Event(SessionEvent),
}

impl Outbound {
    /// Successful reply
    #[must_use]
    pub fn ok(id: Option<Value>, result: Value) -> Self {
        Self::Reply {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed reply
    #[must_use]
    pub fn err(id: Option<Value>, error: ReplyError) -> Self {
        Self::Reply {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}
