//! Process-spawning contract used by the agent adapter
//!
//! The adapter depends only on [`ProcessLauncher`]: given a program and its
//! arguments it receives a writable stdin, a readable stdout and a
//! [`ProcessControl`] for exit notification and termination.
//!
//! - [`subprocess`] launches the real agent CLI with `tokio::process`
//! - [`duplex`] is an in-memory process driven from tests

pub mod duplex;
pub mod subprocess;

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::types::identifiers::SessionId;

/// What to launch for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Session the process belongs to (used for log context)
    pub session_id: SessionId,
    /// Program path or bare program name
    pub program: PathBuf,
    /// Command-line arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides
    pub env: HashMap<String, String>,
}

impl LaunchSpec {
    /// Whether `flag` appears among the arguments
    #[must_use]
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Value following `flag`, if present
    #[must_use]
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(String::as_str)
    }
}

/// How a process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
}

impl ExitInfo {
    /// Exited with status zero
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Exit notification and termination for a launched process
pub trait ProcessControl: Send {
    /// Send a termination signal and reap the process
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;

    /// Wait for the process to exit
    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitInfo>>;
}

/// Byte streams and control handle of a launched process
pub struct ProcessHandles {
    /// The process's stdin
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    /// The process's stdout
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Exit notification and kill
    pub control: Box<dyn ProcessControl>,
}

impl std::fmt::Debug for ProcessHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandles").finish_non_exhaustive()
    }
}

/// Starts agent processes
pub trait ProcessLauncher: Send + Sync {
    /// Launch a process; must be called from within a tokio runtime
    ///
    /// # Errors
    /// Returns an error if the program cannot be located or started
    fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandles>;
}

pub use duplex::{DuplexLauncher, ScriptedProcess};
pub use subprocess::{CommandBuilder, SubprocessLauncher};
