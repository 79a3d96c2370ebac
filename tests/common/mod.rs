//! Shared harness for session tests
//!
//! Sessions run against in-memory agent processes; the test plays the agent
//! through the `ScriptedProcess` handed out for every launch.

#![allow(dead_code)]

use kodegen_agent_sessions::{
    DuplexLauncher, KeyValueStore, MemoryStore, OrchestratorOptions, ProcessLauncher, ScriptedProcess,
    SessionConfig, SessionEvent, SessionId, SessionRegistry, StreamEvent,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub launcher: Arc<DuplexLauncher>,
    pub store: Arc<MemoryStore>,
    pub seen: Vec<SessionEvent>,
    processes: mpsc::UnboundedReceiver<ScriptedProcess>,
    events: broadcast::Receiver<SessionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let (launcher, processes) = DuplexLauncher::new();
        let launcher = Arc::new(launcher);
        let store = Arc::new(MemoryStore::new());
        let options = OrchestratorOptions::builder()
            .stop_timeout(Duration::from_secs(2))
            .build();
        let registry = SessionRegistry::new(
            options,
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
        )
        .unwrap();
        let events = registry.subscribe();

        Self {
            registry: Arc::new(registry),
            launcher,
            store,
            seen: Vec::new(),
            processes,
            events,
        }
    }

    /// Wait until the store holds `expected` at `key`; ledger writes land
    /// in the background
    pub async fn stored(&self, key: &str, expected: impl Fn(Option<&Value>) -> bool) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let value = self.store.get(key).unwrap();
            if expected(value.as_ref()) {
                return value;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "store never settled at {key}: {value:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Create a session and take the agent side of its process
    pub fn create(&mut self, config: SessionConfig) -> (SessionId, ScriptedProcess) {
        let session_id = self.registry.create_session(config);
        let process = self
            .processes
            .try_recv()
            .expect("launch should hand out a scripted process");
        (session_id, process)
    }

    /// Next event from any session
    pub async fn next_event(&mut self) -> SessionEvent {
        let event = tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event bus closed or lagged");
        self.seen.push(event.clone());
        event
    }

    /// Events of `session_id` up to and including the first one matching `done`
    pub async fn until(
        &mut self,
        session_id: &SessionId,
        done: impl Fn(&StreamEvent) -> bool,
    ) -> Vec<StreamEvent> {
        let mut collected = Vec::new();
        loop {
            let event = self.next_event().await;
            if &event.session_id != session_id {
                continue;
            }
            let finished = done(&event.event);
            collected.push(event.event);
            if finished {
                return collected;
            }
        }
    }

    /// Whatever arrives within `window`
    pub async fn settle(&mut self, window: Duration) -> Vec<SessionEvent> {
        let mut collected = Vec::new();
        while let Ok(Ok(event)) = tokio::time::timeout(window, self.events.recv()).await {
            self.seen.push(event.clone());
            collected.push(event);
        }
        collected
    }

    /// Every session's sequence numbers seen so far are 0, 1, 2, ...
    pub fn assert_gapless(&self) {
        let mut per_session: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
        for event in &self.seen {
            per_session
                .entry(event.session_id.as_str())
                .or_default()
                .push(event.seq);
        }
        for (session, seqs) in per_session {
            let expected: Vec<u64> = (0..seqs.len() as u64).collect();
            assert_eq!(seqs, expected, "sequence gap in session {session}");
        }
    }
}

pub fn is_turn_complete(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::TurnComplete { .. })
}

pub fn is_permission_request(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::PermissionRequest { .. })
}

pub fn is_permission_resolved(event: &StreamEvent) -> bool {
    matches!(event, StreamEvent::PermissionResolved { .. })
}

/// Stream-json records an agent writes
pub mod records {
    use super::*;

    pub fn text(text: &str) -> Value {
        json!({
            "type": "assistant",
            "message": { "role": "assistant", "content": [{ "type": "text", "text": text }] }
        })
    }

    pub fn tool_use(id: &str, name: &str, input: Value) -> Value {
        json!({
            "type": "assistant",
            "message": {
                "role": "assistant",
                "content": [{ "type": "tool_use", "id": id, "name": name, "input": input }]
            }
        })
    }

    pub fn can_use_tool(request_id: &str, tool: &str, input: Value, tool_use_id: &str) -> Value {
        json!({
            "type": "control_request",
            "request_id": request_id,
            "request": {
                "subtype": "can_use_tool",
                "tool_name": tool,
                "input": input,
                "tool_use_id": tool_use_id
            }
        })
    }

    pub fn tool_result(tool_use_id: &str, output: &str) -> Value {
        json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": output,
                    "is_error": false
                }]
            }
        })
    }

    pub fn result(total_cost_usd: f64) -> Value {
        json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "total_cost_usd": total_cost_usd,
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        })
    }
}

/// Next record the core wrote to the agent's stdin
pub async fn next_input(agent: &mut ScriptedProcess) -> Value {
    tokio::time::timeout(WAIT, agent.next_input())
        .await
        .expect("timed out waiting for agent input")
        .expect("agent stdin read failed")
        .expect("agent stdin closed")
}
