//! # Agent Sessions for Rust
//!
//! Session and streaming-protocol orchestration for concurrent, CLI-backed
//! coding agents. Each session owns one long-lived agent process; its
//! newline-delimited stdout is parsed into typed [`StreamEvent`]s, tagged
//! with a gapless per-session sequence number and published on one shared
//! [`EventBus`]. Tool calls are gated by a [`PermissionBroker`] that applies
//! the edit mode, a persistent allow-list and a global bypass before asking
//! the user.
//!
//! ## Quick Start
//!
//! ```no_run
//! use kodegen_agent_sessions::{
//!     MemoryStore, OrchestratorOptions, SessionConfig, SessionRegistry, SubprocessLauncher,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::new(
//!         OrchestratorOptions::default(),
//!         Arc::new(SubprocessLauncher),
//!         Arc::new(MemoryStore::new()),
//!     )?;
//!     let mut events = registry.subscribe();
//!
//!     let session = registry.create_session(SessionConfig::default());
//!     registry
//!         .send_message(Some(&session), "List the files in this repo", vec![])
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         log::info!("[{}] #{} {:?}", event.session_id, event.seq, event.event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`]: Identifiers, events, cost, permissions, session config and options
//! - [`message`]: Event Parser for the agent's stream-json lines, plus outbound records
//! - [`transport`]: Process-spawning contract, subprocess and in-memory implementations
//! - [`store`]: Key-value store for the allow-list and cost ledgers
//! - [`permissions`]: Permission Broker and allow-list
//! - [`adapter`]: Agent Process Adapter, one tokio task per session
//! - [`bus`]: Event Bus
//! - [`registry`]: Session Registry, the facade for presentation layers
//! - [`bridge`]: JSON-lines protocol used by the `kodegen-agent-sessions` binary
//! - [`error`]: Error types
//!
//! ## Error Handling
//!
//! Registry calls return [`Result<T, SessionError>`](Result). Failures inside
//! a running session (unparseable lines, agent errors, process exits) are
//! reported as [`StreamEvent::Error`] events instead, so one session's
//! failure never reaches another session's caller.
//!
//! ## Security
//!
//! - **Environment variable filtering** - loader and runtime variables such
//!   as `LD_PRELOAD` and `NODE_OPTIONS` are never passed to the agent
//! - **Line limits** - stdout records longer than the configured maximum
//!   (default 1MB) are discarded and reported
//! - **Permission gating** - tool results are held until their permission
//!   request is resolved

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod bridge;
pub mod bus;
pub mod error;
pub mod message;
pub mod permissions;
pub mod registry;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use adapter::{AgentProcessAdapter, SessionStatus};
pub use bus::{EventBus, EventSink};
pub use error::{Result, SessionError};
pub use message::{ParseFailure, parse_line};
pub use permissions::{AllowList, PermissionBroker};
pub use registry::SessionRegistry;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use transport::{DuplexLauncher, ProcessLauncher, ScriptedProcess, SubprocessLauncher};

// Re-export type submodules for flat public API
pub use types::cost::Cost;
pub use types::events::{ErrorKind, SessionEvent, StreamEvent, TokenCounts};
pub use types::identifiers::{RequestId, SessionId, ToolName};
pub use types::options::{OrchestratorOptions, OrchestratorOptionsBuilder};
pub use types::permissions::{
    AllowRule, EditMode, PermissionDecision, PermissionState, Resolution, ToolCapabilities,
};
pub use types::session::{
    AgentSessionSummary, SessionConfig, SessionConfigBuilder, SessionState, ThinkingIntensity,
};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
