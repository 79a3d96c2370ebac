//! The per-session adapter task
//!
//! One task per session owns the process's stdin, stdout and control handle.
//! It multiplexes three inputs with a biased `select!`: cancellation first,
//! then commands from the handle and broker, then stdout records.

use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::message::{outbound, parse_line};
use crate::permissions::{Evaluation, PermissionBroker};
use crate::transport::ProcessControl;
use crate::types::cost::Cost;
use crate::types::events::{ErrorKind, StreamEvent, TokenCounts};
use crate::types::identifiers::{RequestId, SessionId, ToolName};
use crate::types::permissions::{EditMode, PermissionDecision, ToolCapabilities};
use crate::types::session::SessionState;

use super::commands::AdapterCommand;
use super::framing::{Frame, RecordCodec};
use super::gate::{Release, ToolGate};
use super::ledger::Ledger;
use super::status::{Emitter, SessionStatus};
use super::turn::compose_turn;

const USER_DENIED: &str = "The user denied this tool call";
const DUPLICATE_DENIED: &str = "Duplicate permission request for this tool call";
const PLAN_MODE_RESULT: &str = "Not executed: plan mode is active";

/// Everything the task owns
pub(super) struct AdapterTask {
    pub(super) session_id: SessionId,
    pub(super) emitter: Arc<Emitter>,
    pub(super) status: Arc<RwLock<SessionStatus>>,
    pub(super) broker: Arc<PermissionBroker>,
    pub(super) ledger: Arc<Ledger>,
    pub(super) stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub(super) control: Box<dyn ProcessControl>,
    pub(super) finished: Arc<AtomicBool>,
    pub(super) exit_grace: Duration,
    pub(super) gate: ToolGate,
    pub(super) reported_total: Cost,
}

impl AdapterTask {
    /// Run until stopped or the process goes away
    pub(super) async fn run(
        mut self,
        stdout: Box<dyn AsyncRead + Send + Unpin>,
        max_line_bytes: usize,
        mut commands: mpsc::UnboundedReceiver<AdapterCommand>,
        cancel: CancellationToken,
    ) {
        let mut frames = FramedRead::new(stdout, RecordCodec::new(max_line_bytes));

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    self.finish_stopped(&mut commands).await;
                    break;
                }

                Some(command) = commands.recv() => {
                    self.handle_command(command).await;
                }

                frame = frames.next() => match frame {
                    Some(Ok(Frame::Line(line))) => self.handle_line(&line).await,
                    Some(Ok(Frame::Oversized)) => {
                        log::warn!("[{}] dropped stdout record over {max_line_bytes} bytes", self.session_id);
                        self.emit(StreamEvent::protocol_error(format!(
                            "agent record exceeded {max_line_bytes} bytes and was dropped"
                        )));
                    }
                    Some(Ok(Frame::NotUtf8)) => {
                        log::warn!("[{}] dropped non-UTF-8 stdout record", self.session_id);
                        self.emit(StreamEvent::protocol_error("agent record is not valid UTF-8"));
                    }
                    Some(Err(e)) => {
                        log::error!("[{}] stdout read failed: {e}", self.session_id);
                        self.finish_exited(&mut commands).await;
                        break;
                    }
                    None => {
                        self.finish_exited(&mut commands).await;
                        break;
                    }
                },
            }
        }

        log::debug!("[{}] adapter task finished", self.session_id);
    }

    fn emit(&self, event: StreamEvent) {
        self.emitter.emit(event);
    }

    fn set_state(&self, state: SessionState) {
        let mut status = self.status.write();
        if status.state != SessionState::Closed {
            status.state = state;
        }
    }

    fn edit_mode(&self) -> EditMode {
        self.status.read().edit_mode
    }

    async fn write_record(&mut self, record: &Value) -> Result<()> {
        let line = outbound::to_line(record)?;
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::transport(format!("failed to write to agent stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::transport(format!("failed to flush agent stdin: {e}")))
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: AdapterCommand) {
        match command {
            AdapterCommand::Send {
                text,
                attachments,
                response_tx,
            } => {
                let (mode, thinking) = {
                    let status = self.status.read();
                    (status.edit_mode, status.thinking)
                };
                let turn = compose_turn(&text, &attachments, mode, thinking);
                let result = self.write_record(&outbound::user_turn(&turn)).await;

                match result {
                    Ok(()) => {
                        {
                            let mut status = self.status.write();
                            if status.state == SessionState::Idle {
                                status.state = SessionState::Running;
                            }
                        }
                        self.emit(StreamEvent::UserMessage { text });
                    }
                    Err(ref e) => log::warn!("[{}] send failed: {e}", self.session_id),
                }
                let _ = response_tx.send(result);
            }
            AdapterCommand::ApplyDecision {
                request_id,
                decision,
            } => self.apply_decision(request_id, decision).await,
        }
    }

    async fn apply_decision(&mut self, request_id: RequestId, decision: PermissionDecision) {
        let input = self
            .broker
            .input(&self.session_id, &request_id)
            .unwrap_or(Value::Null);
        self.answer(&request_id, decision, &input, USER_DENIED).await;

        self.emit(StreamEvent::PermissionResolved {
            request_id: request_id.clone(),
            decision,
            automatic: false,
        });

        match self.gate.release(&request_id, decision.permits()) {
            Release::Unguarded => {}
            Release::Allowed(held) => {
                for event in held {
                    let event = self.plan_filter(event);
                    self.emit(event);
                }
            }
            Release::Denied {
                tool_use_id,
                tool_name,
            } => self.emit(StreamEvent::ToolResult {
                tool_use_id,
                tool_name,
                output: USER_DENIED.to_string(),
                is_error: true,
            }),
        }

        if self.broker.pending_count(&self.session_id) == 0 {
            let mut status = self.status.write();
            if status.state == SessionState::AwaitingPermission {
                status.state = SessionState::Running;
            }
        }
    }

    /// Answer a `can_use_tool` request on stdin
    async fn answer(
        &mut self,
        request_id: &RequestId,
        decision: PermissionDecision,
        input: &Value,
        deny_message: &str,
    ) {
        let record = if decision.permits() {
            outbound::allow_tool(request_id, input)
        } else {
            outbound::deny_tool(request_id, deny_message)
        };
        if let Err(e) = self.write_record(&record).await {
            log::warn!(
                "[{}] could not answer permission request {request_id}: {e}",
                self.session_id
            );
        }
    }

    // ------------------------------------------------------------------------
    // Stdout records
    // ------------------------------------------------------------------------

    async fn handle_line(&mut self, line: &str) {
        match parse_line(line) {
            Ok(events) => {
                for event in events {
                    self.dispatch(event).await;
                }
            }
            Err(failure) => {
                log::warn!("[{}] protocol error: {failure}", self.session_id);
                self.emit(StreamEvent::protocol_error(failure.to_string()));
            }
        }
    }

    async fn dispatch(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ToolCall {
                ref tool_use_id,
                ref tool_name,
                ..
            } => {
                self.gate.record_call(tool_use_id, tool_name);
                self.emit(event);
            }
            StreamEvent::ToolResult {
                tool_use_id,
                tool_name,
                output,
                is_error,
            } => {
                let tool_name = tool_name.or_else(|| self.gate.tool_name(&tool_use_id));
                let event = StreamEvent::ToolResult {
                    tool_use_id,
                    tool_name,
                    output,
                    is_error,
                };
                if let Some(event) = self.gate.admit(event) {
                    let event = self.plan_filter(event);
                    self.emit(event);
                }
            }
            StreamEvent::UsageUpdate {
                cost_delta,
                total_cost,
                tokens,
            } => {
                let event = self.account_usage(cost_delta, total_cost, tokens);
                self.emit(event);
            }
            StreamEvent::PermissionRequest {
                request_id,
                tool_name,
                preview,
                tool_use_id,
            } => {
                self.handle_permission_request(request_id, tool_name, preview, tool_use_id)
                    .await;
            }
            StreamEvent::TurnComplete { .. } => {
                {
                    let mut status = self.status.write();
                    if status.state.in_turn() {
                        status.state = SessionState::Idle;
                    }
                }
                self.emit(event);
            }
            other => self.emit(other),
        }
    }

    async fn handle_permission_request(
        &mut self,
        request_id: RequestId,
        tool_name: ToolName,
        preview: Value,
        tool_use_id: Option<String>,
    ) {
        let sid = self.session_id.clone();

        if self.broker.is_known(&sid, &request_id) {
            log::warn!("[{sid}] permission request {request_id} issued twice");
            self.emit(StreamEvent::protocol_error(format!(
                "permission request {request_id} was issued twice"
            )));
            return;
        }

        let tool_use_id = self.gate.guarded_tool_use(tool_use_id, &tool_name);

        if let Some(ref id) = tool_use_id
            && let Some(open) = self.broker.pending_for_tool_use(&sid, id)
        {
            log::warn!("[{sid}] {request_id} duplicates open request {open} for {id}");
            self.broker.record_automatic(
                &sid,
                request_id.clone(),
                tool_name,
                preview,
                tool_use_id.clone(),
                PermissionDecision::Denied,
            );
            self.answer(&request_id, PermissionDecision::Denied, &Value::Null, DUPLICATE_DENIED)
                .await;
            self.emit(StreamEvent::protocol_error(format!(
                "permission request {request_id} duplicates open request {open} for tool use {id}; denied"
            )));
            return;
        }

        match self.broker.evaluate(self.edit_mode(), &tool_name, &preview) {
            Evaluation::Automatic { decision, reason } => {
                log::debug!("[{sid}] {request_id} ({tool_name}) {decision:?} by {reason:?}");
                self.broker.record_automatic(
                    &sid,
                    request_id.clone(),
                    tool_name.clone(),
                    preview.clone(),
                    tool_use_id.clone(),
                    decision,
                );
                self.answer(&request_id, decision, &preview, reason.deny_message())
                    .await;
                self.emit(StreamEvent::PermissionResolved {
                    request_id,
                    decision,
                    automatic: true,
                });

                if !decision.permits()
                    && let Some(id) = tool_use_id
                {
                    self.gate.refuse(id.clone());
                    self.emit(StreamEvent::ToolResult {
                        tool_use_id: id,
                        tool_name: Some(tool_name),
                        output: reason.deny_message().to_string(),
                        is_error: true,
                    });
                }
            }
            Evaluation::Pending => {
                log::info!("[{sid}] {request_id} ({tool_name}) awaiting user decision");
                self.broker.open(
                    &sid,
                    request_id.clone(),
                    tool_name.clone(),
                    preview.clone(),
                    tool_use_id.clone(),
                );
                if let Some(ref id) = tool_use_id {
                    self.gate.hold(id.clone(), request_id.clone());
                }
                self.set_state(SessionState::AwaitingPermission);
                self.emit(StreamEvent::PermissionRequest {
                    request_id,
                    tool_name,
                    preview,
                    tool_use_id,
                });
            }
        }
    }

    /// In plan mode a successful result of a mutating tool becomes a denial
    fn plan_filter(&self, event: StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::ToolResult {
                tool_use_id,
                tool_name,
                is_error: false,
                ..
            } if self.edit_mode() == EditMode::Plan
                && ToolCapabilities::of(tool_name.as_ref().map_or("", ToolName::as_str))
                    .is_mutating() =>
            {
                log::warn!(
                    "[{}] replacing plan-mode result of {tool_use_id}",
                    self.session_id
                );
                StreamEvent::ToolResult {
                    tool_use_id,
                    tool_name,
                    output: PLAN_MODE_RESULT.to_string(),
                    is_error: true,
                }
            }
            other => other,
        }
    }

    /// Convert agent-reported usage into a session delta and update the ledger
    fn account_usage(
        &mut self,
        cost_delta: Cost,
        total_cost: Option<Cost>,
        tokens: TokenCounts,
    ) -> StreamEvent {
        let delta = match total_cost {
            Some(total) => {
                let delta = total.saturating_delta(self.reported_total);
                self.reported_total = self.reported_total.max(total);
                delta
            }
            None => cost_delta.max(Cost::ZERO),
        };

        let (accumulated, totals) = {
            let mut status = self.status.write();
            status.cost += delta;
            status.tokens.accumulate(&tokens);
            (status.cost, status.tokens)
        };

        let ledger = json!({
            "cost": accumulated,
            "tokens": totals,
            "updated_at": chrono::Utc::now(),
        });
        self.ledger.record(ledger);

        StreamEvent::UsageUpdate {
            cost_delta: delta,
            total_cost: Some(accumulated),
            tokens,
        }
    }

    // ------------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------------

    /// Refuse queued sends and record queued decisions; nothing more is
    /// written to the process
    fn drain_commands(&self, commands: &mut mpsc::UnboundedReceiver<AdapterCommand>) {
        commands.close();
        while let Ok(command) = commands.try_recv() {
            match command {
                AdapterCommand::Send { response_tx, .. } => {
                    let _ = response_tx.send(Err(SessionError::not_running(
                        self.session_id.as_str(),
                    )));
                }
                AdapterCommand::ApplyDecision {
                    request_id,
                    decision,
                } => self.emit(StreamEvent::PermissionResolved {
                    request_id,
                    decision,
                    automatic: false,
                }),
            }
        }
    }

    fn force_deny_pending(&mut self) {
        for request_id in self.broker.force_deny_session(&self.session_id) {
            self.emit(StreamEvent::PermissionResolved {
                request_id,
                decision: PermissionDecision::Denied,
                automatic: true,
            });
        }
        self.gate.clear_held();
    }

    fn release_process(&self, state: SessionState) {
        {
            let mut status = self.status.write();
            status.has_process = false;
            if status.state != SessionState::Closed {
                status.state = state;
            }
        }
        self.broker.detach(&self.session_id);
    }

    /// Stop requested: deny what is pending, kill, emit one terminal event
    async fn finish_stopped(&mut self, commands: &mut mpsc::UnboundedReceiver<AdapterCommand>) {
        log::info!("[{}] stopping agent", self.session_id);
        self.drain_commands(commands);
        self.force_deny_pending();

        let terminal = match self.control.kill().await {
            Ok(()) => StreamEvent::TurnComplete { stopped: true },
            Err(e) => {
                log::error!("[{}] failed to kill agent: {e}", self.session_id);
                StreamEvent::Error {
                    kind: ErrorKind::ProcessExit,
                    detail: format!("failed to terminate agent process: {e}"),
                }
            }
        };
        self.release_process(terminal.settled_state());

        if !self.finished.swap(true, Ordering::SeqCst) {
            self.emit(terminal);
        }
    }

    /// Stdout ended without a stop: the process is gone
    async fn finish_exited(&mut self, commands: &mut mpsc::UnboundedReceiver<AdapterCommand>) {
        let detail = match tokio::time::timeout(self.exit_grace, self.control.wait()).await {
            Ok(Ok(exit)) => format!("agent process exited unexpectedly ({exit})"),
            Ok(Err(e)) => format!("agent process exited unexpectedly ({e})"),
            Err(_) => {
                let _ = self.control.kill().await;
                "agent process closed its output without exiting".to_string()
            }
        };
        log::error!("[{}] {detail}", self.session_id);

        let terminal = StreamEvent::Error {
            kind: ErrorKind::ProcessExit,
            detail,
        };
        self.drain_commands(commands);
        self.force_deny_pending();
        self.release_process(terminal.settled_state());

        if !self.finished.swap(true, Ordering::SeqCst) {
            self.emit(terminal);
        }
    }
}
