//! Agent Process Adapter
//!
//! Owns one agent process per session. [`AgentProcessAdapter::start`] spawns
//! the process and a task that turns its stdout into [`StreamEvent`]s; the
//! handle writes turns, forwards permission decisions and stops the process.
//!
//! # Termination contract
//!
//! Every session emits exactly one terminal event per process:
//! `TurnComplete { stopped: true }` after [`stop`](AgentProcessAdapter::stop),
//! or `Error { kind: ProcessExit }` when the process dies on its own or cannot
//! be killed. Pending permission requests are force-denied first.

pub mod commands;
pub(crate) mod framing;
mod gate;
mod ledger;
mod status;
mod task;
mod turn;

pub use status::SessionStatus;
pub use turn::compose_turn;

pub(crate) use status::Emitter;

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::error::{Result, SessionError};
use crate::permissions::PermissionBroker;
use crate::store::KeyValueStore;
use crate::transport::{CommandBuilder, ProcessLauncher};
use crate::types::cost::Cost;
use crate::types::events::{ErrorKind, StreamEvent};
use crate::types::identifiers::{RequestId, SessionId};
use crate::types::options::OrchestratorOptions;
use crate::types::permissions::{EditMode, PermissionDecision, Resolution};
use crate::types::session::{SessionConfig, SessionState};

use commands::AdapterCommand;
use gate::ToolGate;
use ledger::Ledger;
use task::AdapterTask;

/// Shared collaborators every adapter needs
#[derive(Clone)]
pub struct AdapterContext {
    /// Process-wide options
    pub options: Arc<OrchestratorOptions>,
    /// Process-spawning primitive
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Permission broker shared by all sessions
    pub broker: Arc<PermissionBroker>,
    /// Store for cost ledgers
    pub store: Arc<dyn KeyValueStore>,
    /// Where events are published
    pub bus: EventBus,
}

/// Handle to one session's agent process
pub struct AgentProcessAdapter {
    session_id: SessionId,
    status: Arc<RwLock<SessionStatus>>,
    emitter: Arc<Emitter>,
    broker: Arc<PermissionBroker>,
    commands: Option<mpsc::UnboundedSender<AdapterCommand>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    finished: Arc<AtomicBool>,
    stop_timeout: Duration,
    ledger: Arc<Ledger>,
}

impl AgentProcessAdapter {
    /// Spawn the agent process for a session
    ///
    /// A launch failure does not fail this call: the adapter comes back in
    /// the `error` state after emitting `Error { kind: SpawnFailed }`.
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(
        session_id: SessionId,
        name: String,
        config: &SessionConfig,
        ctx: &AdapterContext,
    ) -> Self {
        let status = Arc::new(RwLock::new(SessionStatus::new(
            name,
            config.edit_mode,
            config.model.clone(),
            config.thinking,
        )));
        let emitter = Arc::new(Emitter::new(
            session_id.clone(),
            ctx.bus.clone(),
            Arc::clone(&status),
        ));
        let finished = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let ledger = Arc::new(Ledger::new(session_id.clone(), Arc::clone(&ctx.store)));

        let spec = CommandBuilder::new(&ctx.options, config).build(&session_id);
        let mut adapter = Self {
            session_id: session_id.clone(),
            status: Arc::clone(&status),
            emitter: Arc::clone(&emitter),
            broker: Arc::clone(&ctx.broker),
            commands: None,
            cancel: cancel.clone(),
            task: Mutex::new(None),
            finished: Arc::clone(&finished),
            stop_timeout: ctx.options.stop_timeout,
            ledger: Arc::clone(&ledger),
        };

        let handles = match ctx.launcher.launch(&spec) {
            Ok(handles) => handles,
            Err(e) => {
                log::error!("[{session_id}] failed to start agent: {e}");
                let terminal = StreamEvent::Error {
                    kind: ErrorKind::SpawnFailed,
                    detail: e.to_string(),
                };
                status.write().state = terminal.settled_state();
                finished.store(true, Ordering::SeqCst);
                emitter.emit(terminal);
                return adapter;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        ctx.broker.attach(session_id.clone(), tx.clone());
        status.write().has_process = true;

        let task = AdapterTask {
            session_id: session_id.clone(),
            emitter,
            status,
            broker: Arc::clone(&ctx.broker),
            ledger,
            stdin: handles.stdin,
            control: handles.control,
            finished,
            exit_grace: ctx.options.stop_timeout / 2,
            gate: ToolGate::default(),
            reported_total: Cost::ZERO,
        };
        let handle = tokio::spawn(task.run(
            handles.stdout,
            ctx.options.max_line_bytes,
            rx,
            cancel,
        ));

        log::info!("[{session_id}] agent session started");
        adapter.commands = Some(tx);
        adapter.task = Mutex::new(Some(handle));
        adapter
    }

    /// Session this adapter belongs to
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Snapshot of the session's status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    /// Whether a live process is attached
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.commands.as_ref().is_some_and(|tx| !tx.is_closed())
            && !self.finished.load(Ordering::SeqCst)
    }

    /// Write a new turn to the agent
    ///
    /// Returns once the write was accepted; replies arrive as events.
    ///
    /// # Errors
    /// `NotRunning` if the process exited or was stopped; `Transport` if the
    /// write failed
    pub async fn send(&self, text: impl Into<String>, attachments: Vec<PathBuf>) -> Result<()> {
        let not_running = || SessionError::not_running(self.session_id.as_str());
        let commands = self
            .commands
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .ok_or_else(not_running)?;

        let (response_tx, response_rx) = oneshot::channel();
        commands
            .send(AdapterCommand::Send {
                text: text.into(),
                attachments,
                response_tx,
            })
            .map_err(|_| not_running())?;
        response_rx.await.map_err(|_| not_running())?
    }

    /// Resolve a pending permission request of this session
    ///
    /// # Errors
    /// `UnknownRequest` for ids the session never issued; `NotRunning` when
    /// the request is pending but the process is gone
    pub fn resolve_permission(
        &self,
        request_id: &RequestId,
        decision: PermissionDecision,
    ) -> Result<Resolution> {
        self.broker.resolve(&self.session_id, request_id, decision)
    }

    /// Change the edit mode applied to later permission requests and turns
    pub fn set_edit_mode(&self, mode: EditMode) {
        self.status.write().edit_mode = mode;
        log::info!("[{}] edit mode set to {mode}", self.session_id);
    }

    /// Terminate the process
    ///
    /// Safe to call concurrently with `send` and permission resolution, and
    /// more than once; calls after the process is gone do nothing.
    ///
    /// # Errors
    /// `Timeout` if the task did not finish within the stop timeout; the
    /// terminal event is still emitted
    pub async fn stop(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        let Some(handle) = task.as_mut() else {
            return Ok(());
        };

        self.cancel.cancel();
        let outcome = tokio::time::timeout(self.stop_timeout, &mut *handle).await;
        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                log::error!("[{}] adapter task failed: {e}", self.session_id);
                self.emit_fallback_terminal(format!("adapter task failed: {e}"));
                Ok(())
            }
            Err(_) => {
                handle.abort();
                let detail = format!("agent did not stop within {:?}", self.stop_timeout);
                log::error!("[{}] {detail}", self.session_id);
                self.emit_fallback_terminal(detail.clone());
                Err(SessionError::timeout(detail))
            }
        };
        *task = None;
        result
    }

    fn emit_fallback_terminal(&self, detail: String) {
        for request_id in self.broker.force_deny_session(&self.session_id) {
            self.emitter.emit(StreamEvent::PermissionResolved {
                request_id,
                decision: PermissionDecision::Denied,
                automatic: true,
            });
        }
        let terminal = StreamEvent::Error {
            kind: ErrorKind::ProcessExit,
            detail,
        };
        {
            let mut status = self.status.write();
            status.has_process = false;
            if status.state != SessionState::Closed {
                status.state = terminal.settled_state();
            }
        }
        self.broker.detach(&self.session_id);
        if !self.finished.swap(true, Ordering::SeqCst) {
            self.emitter.emit(terminal);
        }
    }

    /// Stop the process and close the session; later events are dropped
    ///
    /// The session's cost ledger is removed from the store.
    pub async fn dispose(&self) {
        if let Err(e) = self.stop().await {
            log::warn!("[{}] stop during dispose: {e}", self.session_id);
        }
        {
            let mut status = self.status.write();
            status.state = SessionState::Closed;
            status.has_process = false;
        }
        self.broker.forget_session(&self.session_id);
        self.ledger.discard().await;
        log::info!("[{}] session closed", self.session_id);
    }
}

impl Drop for AgentProcessAdapter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
