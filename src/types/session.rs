//! Session configuration and summary types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::cost::Cost;
use super::identifiers::SessionId;
use super::permissions::EditMode;

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of an agent session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Created, no turn in flight
    #[default]
    Idle,
    /// A turn is in flight
    Running,
    /// A turn is in flight but blocked on a permission request
    AwaitingPermission,
    /// The agent process failed; the session can only be closed
    Error,
    /// Explicitly closed; terminal
    Closed,
}

impl SessionState {
    /// Whether a turn is currently in flight
    #[must_use]
    pub const fn in_turn(self) -> bool {
        matches!(self, Self::Running | Self::AwaitingPermission)
    }

    /// Human-readable label for status badges
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::AwaitingPermission => "Awaiting permission",
            Self::Error => "Error",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How much reasoning effort to request for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingIntensity {
    /// "think"
    Think,
    /// "think hard"
    ThinkHard,
    /// "think harder"
    ThinkHarder,
    /// "ultrathink"
    Ultrathink,
}

impl ThinkingIntensity {
    /// Directive the agent CLI recognises
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Think => "THINK",
            Self::ThinkHard => "THINK HARD",
            Self::ThinkHarder => "THINK HARDER",
            Self::Ultrathink => "ULTRATHINK",
        }
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Per-session configuration supplied at creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Display name; defaults to "Agent N"
    #[serde(default)]
    pub name: Option<String>,
    /// Initial edit mode
    #[serde(default)]
    pub edit_mode: EditMode,
    /// Model override passed to the CLI
    #[serde(default)]
    pub model: Option<String>,
    /// Reasoning effort directive added to each turn
    #[serde(default)]
    pub thinking: Option<ThinkingIntensity>,
    /// Working directory for the agent process
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Set initial edit mode
    #[must_use]
    pub const fn edit_mode(mut self, mode: EditMode) -> Self {
        self.config.edit_mode = mode;
        self
    }

    /// Set model override
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Set thinking intensity
    #[must_use]
    pub const fn thinking(mut self, intensity: ThinkingIntensity) -> Self {
        self.config.thinking = Some(intensity);
        self
    }

    /// Set working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(path.into());
        self
    }

    /// Build the config
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Session Summary
// ============================================================================

/// Snapshot of a session for `list_sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSessionSummary {
    /// Session id
    pub session_id: SessionId,
    /// Display name
    pub name: String,
    /// Lifecycle state
    pub state: SessionState,
    /// Current edit mode
    pub edit_mode: EditMode,
    /// Model override, if any
    pub model: Option<String>,
    /// Accumulated cost
    pub cost: Cost,
    /// Last time the session emitted or accepted anything
    pub last_activity: DateTime<Utc>,
    /// Derived from the latest assistant or tool message
    pub task_summary: String,
    /// Whether an agent process is attached
    pub has_process: bool,
    /// Permission requests still waiting on the user
    pub pending_permissions: usize,
    /// Whether this session has focus
    pub focused: bool,
}
