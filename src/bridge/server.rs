//! Bridge run loop

use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::adapter::framing::{Frame, RecordCodec};
use crate::error::{Result, SessionError};
use crate::registry::SessionRegistry;

use super::protocol::{Command, Outbound, ReplyError};

/// Run one command against the registry; returns the reply payload
///
/// # Errors
/// Whatever the registry operation returns
pub async fn execute(registry: &SessionRegistry, command: Command) -> Result<Value> {
    let result = match command {
        Command::CreateSession { config } => {
            let session_id = registry.create_session(config.unwrap_or_default());
            json!({ "session_id": session_id })
        }
        Command::CloseSession { session_id } => {
            registry.close_session(&session_id).await?;
            Value::Null
        }
        Command::FocusSession { session_id } => {
            registry.focus_session(&session_id)?;
            Value::Null
        }
        Command::ListSessions => serde_json::to_value(registry.list_sessions())?,
        Command::SendMessage {
            session_id,
            text,
            attachments,
        } => {
            registry
                .send_message(session_id.as_ref(), text, attachments)
                .await?;
            Value::Null
        }
        Command::StopSession { session_id } => {
            registry.stop_session(session_id.as_ref()).await?;
            Value::Null
        }
        Command::ResolvePermission {
            session_id,
            request_id,
            decision,
        } => serde_json::to_value(registry.resolve_permission(&session_id, &request_id, decision)?)?,
        Command::SetEditMode { session_id, mode } => {
            registry.set_edit_mode(session_id.as_ref(), mode)?;
            Value::Null
        }
        Command::SetGlobalBypass { enabled } => {
            registry.set_global_bypass(enabled);
            Value::Null
        }
        Command::AddAllowRule { tool_name, pattern } => {
            let added = registry.add_allow_rule(tool_name, pattern)?;
            json!({ "added": added })
        }
        Command::ListAllowRules => serde_json::to_value(registry.list_allow_rules())?,
    };
    Ok(result)
}

/// Parse one input line into its caller id and command
fn decode(line: &str) -> std::result::Result<(Option<Value>, Command), (Option<Value>, ReplyError)> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| (None, ReplyError::invalid_command(format!("invalid JSON: {e}"))))?;
    let id = value.get("id").cloned();
    let command = serde_json::from_value(value)
        .map_err(|e| (id.clone(), ReplyError::invalid_command(e.to_string())))?;
    Ok((id, command))
}

/// Execute a decoded command and build its reply
async fn handle(registry: &SessionRegistry, id: Option<Value>, command: Command) -> Outbound {
    let name = command.name();
    log::debug!("bridge command {name}");
    match execute(registry, command).await {
        Ok(result) => Outbound::ok(id, result),
        Err(e) => {
            log::debug!("bridge command {name} failed: {e}");
            Outbound::err(id, ReplyError::from(&e))
        }
    }
}

/// Stdio-style bridge between a presentation process and a registry
pub struct Bridge {
    registry: Arc<SessionRegistry>,
    max_line_bytes: usize,
}

impl Bridge {
    /// Create a bridge over `registry`
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>, max_line_bytes: usize) -> Self {
        Self {
            registry,
            max_line_bytes,
        }
    }

    /// Serve commands from `input` until it ends, then close every session
    ///
    /// Commands that only touch registry state run inline in arrival order.
    /// Commands that wait on an agent process run as their own task so a
    /// stalled session cannot hold up the others; their replies may
    /// overtake each other and are matched to commands by `id`. Events are
    /// written as they are published, interleaved with replies at line
    /// granularity.
    ///
    /// # Errors
    /// Returns an error if reading `input` fails
    pub async fn run<R, W>(self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_lines(output, out_rx));
        let cancel = CancellationToken::new();
        let forwarder = self.forward_events(out_tx.clone(), cancel.clone());
        let mut in_flight = JoinSet::new();

        let mut lines = FramedRead::new(input, RecordCodec::new(self.max_line_bytes));
        let outcome = loop {
            let frame = match lines.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(SessionError::transport(format!("bridge input: {e}"))),
                None => break Ok(()),
            };
            // Reap finished commands so the set stays small
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    log::warn!("bridge command task failed: {e}");
                }
            }

            let reply = match frame {
                Frame::Line(line) if line.trim().is_empty() => continue,
                Frame::Line(line) => match decode(&line) {
                    Ok((id, command)) if command.waits_on_session() => {
                        let registry = Arc::clone(&self.registry);
                        let out_tx = out_tx.clone();
                        in_flight.spawn(async move {
                            let reply = handle(&registry, id, command).await;
                            let _ = out_tx.send(reply);
                        });
                        continue;
                    }
                    Ok((id, command)) => handle(&self.registry, id, command).await,
                    Err((id, error)) => {
                        log::warn!("rejected bridge command: {}", error.message);
                        Outbound::err(id, error)
                    }
                },
                Frame::Oversized => Outbound::err(
                    None,
                    ReplyError::invalid_command(format!(
                        "command longer than {} bytes",
                        self.max_line_bytes
                    )),
                ),
                Frame::NotUtf8 => Outbound::err(None, ReplyError::invalid_command("command is not UTF-8")),
            };
            if out_tx.send(reply).is_err() {
                break Err(SessionError::transport("bridge output closed"));
            }
        };

        log::info!("bridge input ended, closing sessions");
        self.registry.shutdown().await;
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                log::warn!("bridge command task failed: {e}");
            }
        }
        cancel.cancel();
        if let Err(e) = forwarder.await {
            log::warn!("event forwarder failed: {e}");
        }
        drop(out_tx);
        if let Err(e) = writer.await {
            log::warn!("bridge writer failed: {e}");
        }
        outcome
    }

    /// Copy bus events into the output queue until cancelled, then drain
    fn forward_events(
        &self,
        out_tx: mpsc::UnboundedSender<Outbound>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut events = self.registry.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    received = events.recv() => match received {
                        Ok(event) => {
                            if out_tx.send(Outbound::Event(event)).is_err() {
                                return;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("bridge lagged, {skipped} event(s) skipped");
                        }
                        Err(RecvError::Closed) => return,
                    },
                    () = cancel.cancelled() => break,
                }
            }
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        if out_tx.send(Outbound::Event(event)).is_err() {
                            return;
                        }
                    }
                    Err(TryRecvError::Lagged(skipped)) => {
                        log::warn!("bridge lagged, {skipped} event(s) skipped");
                    }
                    Err(_) => return,
                }
            }
        })
    }
}

async fn write_lines<W>(mut output: W, mut lines: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        let mut encoded = match serde_json::to_string(&line) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("failed to encode bridge line: {e}");
                continue;
            }
        };
        encoded.push('\n');
        if let Err(e) = output.write_all(encoded.as_bytes()).await {
            log::error!("bridge output failed: {e}");
            return;
        }
        if let Err(e) = output.flush().await {
            log::error!("bridge output failed: {e}");
            return;
        }
    }
}
