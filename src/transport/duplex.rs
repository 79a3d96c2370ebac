//! In-memory agent processes backed by `tokio::io::duplex`
//!
//! Every launch produces a [`ScriptedProcess`] on the launcher's receiver.
//! The test holding it plays the agent: it writes stdout records, reads the
//! records the core wrote to stdin, and decides when the process exits.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::{mpsc, watch};

use crate::error::{Result, SessionError};
use crate::transport::{ExitInfo, LaunchSpec, ProcessControl, ProcessHandles, ProcessLauncher};

const PIPE_CAPACITY: usize = 64 * 1024;

type ExitSignal = Arc<watch::Sender<Option<ExitInfo>>>;

/// Launcher whose processes live in memory
pub struct DuplexLauncher {
    processes: mpsc::UnboundedSender<ScriptedProcess>,
    fail_with: Mutex<Option<String>>,
}

impl DuplexLauncher {
    /// Create a launcher and the receiver its processes are delivered on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedProcess>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                processes: tx,
                fail_with: Mutex::new(None),
            },
            rx,
        )
    }

    /// Make every following launch fail with `reason` (`None` restores launches)
    pub fn fail_launches(&self, reason: Option<&str>) {
        *self.fail_with.lock() = reason.map(str::to_string);
    }
}

impl ProcessLauncher for DuplexLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<ProcessHandles> {
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(SessionError::spawn(reason));
        }

        let (core_stdin, agent_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (agent_stdout, core_stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, _) = watch::channel(None);
        let exit: ExitSignal = Arc::new(exit_tx);
        let killed = Arc::new(AtomicBool::new(false));

        let process = ScriptedProcess {
            spec: spec.clone(),
            stdout: Some(agent_stdout),
            stdin: BufReader::new(agent_stdin).lines(),
            exit: Arc::clone(&exit),
            killed: Arc::clone(&killed),
        };
        self.processes
            .send(process)
            .map_err(|_| SessionError::spawn("scripted process receiver dropped"))?;

        Ok(ProcessHandles {
            stdin: Box::new(core_stdin),
            stdout: Box::new(core_stdout),
            control: Box::new(DuplexControl { exit, killed }),
        })
    }
}

struct DuplexControl {
    exit: ExitSignal,
    killed: Arc<AtomicBool>,
}

impl ProcessControl for DuplexControl {
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.killed.store(true, Ordering::SeqCst);
        set_exit_once(&self.exit, ExitInfo { code: None });
        futures::future::ready(Ok(())).boxed()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitInfo>> {
        let mut rx = self.exit.subscribe();
        async move {
            let exit = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "exit signal dropped"))?;
            Ok((*exit).unwrap_or(ExitInfo { code: None }))
        }
        .boxed()
    }
}

fn set_exit_once(exit: &ExitSignal, info: ExitInfo) {
    exit.send_if_modified(|slot| {
        if slot.is_none() {
            *slot = Some(info);
            true
        } else {
            false
        }
    });
}

/// The agent side of an in-memory process
pub struct ScriptedProcess {
    spec: LaunchSpec,
    stdout: Option<DuplexStream>,
    stdin: Lines<BufReader<DuplexStream>>,
    exit: ExitSignal,
    killed: Arc<AtomicBool>,
}

impl ScriptedProcess {
    /// What the core asked to launch
    #[must_use]
    pub const fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Write a raw stdout line (a newline is appended)
    ///
    /// # Errors
    /// Returns an error once stdout has been closed or the reader is gone
    pub async fn emit_raw(&mut self, line: &str) -> io::Result<()> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))?;
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    }

    /// Write one JSON record to stdout
    ///
    /// # Errors
    /// Returns an error once stdout has been closed or the reader is gone
    pub async fn emit(&mut self, record: &Value) -> io::Result<()> {
        self.emit_raw(&record.to_string()).await
    }

    /// Next record the core wrote to stdin; `None` once stdin is closed
    ///
    /// # Errors
    /// Returns an error if the line is not JSON
    pub async fn next_input(&mut self) -> io::Result<Option<Value>> {
        match self.stdin.next_line().await? {
            Some(line) => serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }

    /// Close stdout without exiting
    pub fn close_stdout(&mut self) {
        self.stdout = None;
    }

    /// Whether the core killed this process
    #[must_use]
    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Exit with `code`, closing stdout
    pub fn exit(mut self, code: i32) {
        self.stdout = None;
        set_exit_once(&self.exit, ExitInfo { code: Some(code) });
    }
}

impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        set_exit_once(&self.exit, ExitInfo { code: None });
    }
}
