//! Orchestrator options and configuration
//!
//! This module contains the process-wide options for the orchestrator,
//! including a builder pattern for easy configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default maximum length of one stdout record (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default event bus capacity per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Default time allowed for `stop()` to complete
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Orchestrator Options
// ============================================================================

/// Process-wide options shared by every session
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Path to the agent CLI (searched on PATH when `None`)
    pub cli_path: Option<PathBuf>,
    /// Extra arguments appended to every launch
    pub extra_args: Vec<String>,
    /// Default working directory for sessions that do not set one
    pub cwd: Option<PathBuf>,
    /// Environment overrides for the agent process
    pub env: HashMap<String, String>,
    /// Maximum length of one stdout record
    pub max_line_bytes: usize,
    /// Event bus capacity per subscriber
    pub event_capacity: usize,
    /// Time allowed for `stop()` to complete
    pub stop_timeout: Duration,
    /// Ask the CLI for streaming partial messages
    pub include_partial_messages: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            extra_args: Vec::new(),
            cwd: None,
            env: HashMap::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            include_partial_messages: true,
        }
    }
}

impl OrchestratorOptions {
    /// Create a new builder for `OrchestratorOptions`
    #[must_use]
    pub fn builder() -> OrchestratorOptionsBuilder {
        OrchestratorOptionsBuilder::default()
    }
}

// ============================================================================
// Builder for OrchestratorOptions
// ============================================================================

/// Builder for `OrchestratorOptions`
#[derive(Debug, Default)]
pub struct OrchestratorOptionsBuilder {
    options: OrchestratorOptions,
}

impl OrchestratorOptionsBuilder {
    /// Set CLI path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    /// Add an extra CLI argument
    #[must_use]
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.options.extra_args.push(arg.into());
        self
    }

    /// Set default working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Add an environment variable for the agent process
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set maximum stdout record length
    ///
    /// # Panics
    /// Panics if `bytes` is zero
    #[must_use]
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "max_line_bytes must be positive");
        self.options.max_line_bytes = bytes;
        self
    }

    /// Set event bus capacity
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "event_capacity must be positive");
        self.options.event_capacity = capacity;
        self
    }

    /// Set stop timeout
    #[must_use]
    pub const fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.options.stop_timeout = timeout;
        self
    }

    /// Toggle streaming partial messages
    #[must_use]
    pub const fn include_partial_messages(mut self, enabled: bool) -> Self {
        self.options.include_partial_messages = enabled;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> OrchestratorOptions {
        self.options
    }
}
