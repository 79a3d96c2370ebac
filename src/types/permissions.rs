//! Permission-related type definitions
//!
//! This module contains types for edit-mode policy, permission decisions and
//! request states, allow-list rules, and tool capability classification.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::ToolName;

// ============================================================================
// Permission Types
// ============================================================================

/// Edit mode policy governing how tool calls are approved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Planning only - tool calls never execute
    Plan,
    /// Auto-allow every tool call
    Auto,
    /// Ask the user unless covered by the allow-list or bypass
    #[default]
    Ask,
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plan => "plan",
            Self::Auto => "auto",
            Self::Ask => "ask",
        })
    }
}

/// Terminal decision for a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionDecision {
    /// Allow this invocation
    Allowed,
    /// Refuse this invocation
    Denied,
    /// Allow this invocation and add an allow-list rule for similar ones
    AllowedAlways,
}

impl PermissionDecision {
    /// Whether the tool call may proceed
    #[must_use]
    pub const fn permits(self) -> bool {
        matches!(self, Self::Allowed | Self::AllowedAlways)
    }
}

/// State of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "decision", rename_all = "snake_case")]
pub enum PermissionState {
    /// Waiting for an explicit user decision
    Pending,
    /// Final; further resolutions are no-ops
    Resolved(PermissionDecision),
}

/// Outcome of a `resolve_permission` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "decision", rename_all = "snake_case")]
pub enum Resolution {
    /// This call performed the pending → terminal transition
    Resolved(PermissionDecision),
    /// The request was already final; nothing changed
    AlreadyResolved(PermissionDecision),
}

/// Persistent allow-list rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowRule {
    /// Tool the rule applies to
    pub tool_name: ToolName,
    /// Glob matched against the command of command-bearing tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl AllowRule {
    /// Rule covering every invocation of a tool
    pub fn tool(tool_name: impl Into<ToolName>) -> Self {
        Self {
            tool_name: tool_name.into(),
            pattern: None,
        }
    }

    /// Rule covering commands matching `pattern`
    pub fn with_pattern(tool_name: impl Into<ToolName>, pattern: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            pattern: Some(pattern.into()),
        }
    }
}

impl fmt::Display for AllowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pattern {
            Some(pattern) => write!(f, "{}({pattern})", self.tool_name),
            None => write!(f, "{}", self.tool_name),
        }
    }
}

// ============================================================================
// Tool Capabilities
// ============================================================================

bitflags! {
    /// What a tool can do to the outside world
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ToolCapabilities: u8 {
        /// Reads files or workspace state
        const READ = 0b0001;
        /// Writes or edits files
        const WRITE = 0b0010;
        /// Runs commands
        const EXECUTE = 0b0100;
        /// Talks to the network
        const NETWORK = 0b1000;
    }
}

impl ToolCapabilities {
    /// Capabilities that change state outside the conversation
    pub const MUTATING: Self = Self::WRITE.union(Self::EXECUTE).union(Self::NETWORK);

    /// Classify a tool by name; unknown tools are assumed to be mutating
    #[must_use]
    pub fn of(tool_name: &str) -> Self {
        match tool_name {
            "Read" | "Glob" | "Grep" | "LS" | "NotebookRead" | "TodoRead" => Self::READ,
            "Edit" | "Write" | "MultiEdit" | "NotebookEdit" | "TodoWrite" => {
                Self::READ | Self::WRITE
            }
            "Bash" | "BashOutput" | "KillShell" | "KillBash" => Self::EXECUTE,
            "WebFetch" | "WebSearch" => Self::NETWORK,
            _ => Self::MUTATING,
        }
    }

    /// Whether any mutating capability is present
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        self.intersects(Self::MUTATING)
    }
}
