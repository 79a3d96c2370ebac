//! Type definitions for the agent session orchestrator
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `RequestId`, `ToolName`)
//! - [`cost`] - Fixed-point monetary amounts
//! - [`events`] - `StreamEvent` and its `SessionEvent` envelope
//! - [`permissions`] - Edit modes, decisions, allow-list rules, tool capabilities
//! - [`session`] - Session lifecycle, configuration and summaries
//! - [`options`] - Process-wide orchestrator options

pub mod cost;
pub mod events;
pub mod identifiers;
pub mod options;
pub mod permissions;
pub mod session;

// Re-export commonly used types
pub use cost::Cost;
pub use events::{ErrorKind, SessionEvent, StreamEvent, TokenCounts};
pub use identifiers::{RequestId, SessionId, ToolName};
pub use options::{OrchestratorOptions, OrchestratorOptionsBuilder};
pub use permissions::{
    AllowRule, EditMode, PermissionDecision, PermissionState, Resolution, ToolCapabilities,
};
pub use session::{
    AgentSessionSummary, SessionConfig, SessionConfigBuilder, SessionState, ThinkingIntensity,
};
