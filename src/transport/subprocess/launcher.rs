//! `tokio::process` implementation of [`ProcessLauncher`]

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{Result, SessionError};
use crate::transport::{LaunchSpec, ProcessHandles, ProcessLauncher};

use super::config::DEFAULT_CLI_NAME;
use super::lifecycle::{ChildControl, spawn_stderr_pump};

/// Launches the agent CLI as a child process
#[derive(Debug, Default, Clone)]
pub struct SubprocessLauncher;

impl SubprocessLauncher {
    /// Create a new launcher
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve_program(program: &Path) -> Result<PathBuf> {
        if program == Path::new(DEFAULT_CLI_NAME) {
            return find_cli();
        }
        Ok(program.to_path_buf())
    }
}

/// Find the agent CLI binary
///
/// # Errors
/// Returns error if the CLI cannot be found in PATH or common locations
pub fn find_cli() -> Result<PathBuf> {
    if let Ok(path) = which::which(DEFAULT_CLI_NAME) {
        return Ok(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| String::from("/root"));
    let home = PathBuf::from(home);
    let locations = [
        home.join(".npm-global/bin/claude"),
        PathBuf::from("/usr/local/bin/claude"),
        home.join(".local/bin/claude"),
        home.join(".claude/local/claude"),
        home.join("node_modules/.bin/claude"),
        home.join(".yarn/bin/claude"),
    ];

    locations
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(SessionError::cli_not_found)
}

impl ProcessLauncher for SubprocessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandles> {
        let program = Self::resolve_program(&spec.program)?;
        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .env("CLAUDE_CODE_ENTRYPOINT", "sdk-rust")
            .kill_on_drop(true);

        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }

        // Stderr is piped rather than inherited so the child never touches the
        // parent's terminal.
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match spec.cwd {
            Some(ref cwd) if !cwd.exists() => SessionError::spawn(format!(
                "working directory does not exist: {}",
                cwd.display()
            )),
            _ => SessionError::spawn(format!("failed to start {}: {e}", program.display())),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::spawn("failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::spawn("failed to get stdout handle"))?;
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_pump(spec.session_id.clone(), stderr));

        log::info!(
            "[{}] launched {} (pid {:?})",
            spec.session_id,
            program.display(),
            child.id()
        );

        Ok(ProcessHandles {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            control: Box::new(ChildControl::new(child, stderr_task)),
        })
    }
}
