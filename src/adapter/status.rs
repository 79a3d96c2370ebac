//! Shared per-session status and the sequenced event emitter

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::bus::EventBus;
use crate::permissions::command_of;
use crate::types::cost::Cost;
use crate::types::events::{SessionEvent, StreamEvent, TokenCounts};
use crate::types::identifiers::SessionId;
use crate::types::permissions::EditMode;
use crate::types::session::{SessionState, ThinkingIntensity};

const SUMMARY_CHARS: usize = 80;

/// Mutable status of one session
///
/// Written by the session's adapter task; the registry reads snapshots and
/// changes only the edit mode.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    /// Display name
    pub name: String,
    /// Lifecycle state
    pub state: SessionState,
    /// Current edit mode
    pub edit_mode: EditMode,
    /// Model override
    pub model: Option<String>,
    /// Thinking directive added to turns
    pub thinking: Option<ThinkingIntensity>,
    /// Accumulated cost, never decreasing
    pub cost: Cost,
    /// Accumulated token counters
    pub tokens: TokenCounts,
    /// Last emitted or accepted activity
    pub last_activity: DateTime<Utc>,
    /// Derived from the latest assistant text or tool call
    pub task_summary: String,
    /// Whether an agent process is attached
    pub has_process: bool,
}

impl SessionStatus {
    pub(crate) fn new(
        name: String,
        edit_mode: EditMode,
        model: Option<String>,
        thinking: Option<ThinkingIntensity>,
    ) -> Self {
        Self {
            name,
            state: SessionState::Idle,
            edit_mode,
            model,
            thinking,
            cost: Cost::ZERO,
            tokens: TokenCounts::default(),
            last_activity: Utc::now(),
            task_summary: String::new(),
            has_process: false,
        }
    }
}

/// Summary line derived from an event, if it says what the agent is doing
fn summarize(event: &StreamEvent) -> Option<String> {
    let text = match event {
        StreamEvent::AssistantMessage {
            text,
            partial: false,
        } => text.lines().find(|l| !l.trim().is_empty())?.trim().to_string(),
        StreamEvent::ToolCall {
            tool_name, input, ..
        } => match command_of(input)
            .or_else(|| input.get("file_path").and_then(serde_json::Value::as_str))
        {
            Some(target) => format!("{tool_name}: {target}"),
            None => tool_name.to_string(),
        },
        _ => return None,
    };

    Some(match text.char_indices().nth(SUMMARY_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text,
    })
}

/// Stamps events with gapless per-session sequence numbers and publishes them
pub(crate) struct Emitter {
    session_id: SessionId,
    bus: EventBus,
    status: Arc<RwLock<SessionStatus>>,
    next_seq: Mutex<u64>,
}

impl Emitter {
    pub(crate) fn new(session_id: SessionId, bus: EventBus, status: Arc<RwLock<SessionStatus>>) -> Self {
        Self {
            session_id,
            bus,
            status,
            next_seq: Mutex::new(0),
        }
    }

    /// Publish an event; returns its sequence number, or `None` when dropped
    /// because the session is closed
    pub(crate) fn emit(&self, event: StreamEvent) -> Option<u64> {
        // Holding the counter while publishing keeps bus order equal to seq order.
        let mut next_seq = self.next_seq.lock();
        {
            let mut status = self.status.write();
            if status.state == SessionState::Closed {
                log::debug!(
                    "[{}] dropping {} for closed session",
                    self.session_id,
                    event.kind_name()
                );
                return None;
            }
            status.last_activity = Utc::now();
            if let Some(summary) = summarize(&event) {
                status.task_summary = summary;
            }
        }

        let seq = *next_seq;
        *next_seq += 1;
        log::debug!("[{}] #{seq} {}", self.session_id, event.kind_name());
        self.bus.publish(SessionEvent {
            session_id: self.session_id.clone(),
            seq,
            timestamp: Utc::now(),
            event,
        });
        Some(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identifiers::ToolName;
    use serde_json::json;

    #[test]
    fn summary_from_tool_call_command() {
        let event = StreamEvent::ToolCall {
            tool_use_id: "t1".into(),
            tool_name: ToolName::new("Bash"),
            input: json!({ "command": "cargo test" }),
        };
        assert_eq!(summarize(&event).as_deref(), Some("Bash: cargo test"));
    }

    #[test]
    fn partial_text_does_not_change_summary() {
        let event = StreamEvent::AssistantMessage {
            text: "chunk".into(),
            partial: true,
        };
        assert_eq!(summarize(&event), None);
    }

    #[test]
    fn closed_session_drops_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let status = Arc::new(RwLock::new(SessionStatus::new(
            "Agent 1".into(),
            EditMode::Ask,
            None,
            None,
        )));
        let emitter = Emitter::new(SessionId::new("s1"), bus, Arc::clone(&status));

        assert_eq!(emitter.emit(StreamEvent::notice("a")), Some(0));
        status.write().state = SessionState::Closed;
        assert_eq!(emitter.emit(StreamEvent::notice("b")), None);

        assert_eq!(rx.try_recv().map(|e| e.seq).ok(), Some(0));
        assert!(rx.try_recv().is_err());
    }
}
