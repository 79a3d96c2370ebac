//! Holds tool results back while their permission request is pending

use std::collections::HashMap;

use crate::types::events::StreamEvent;
use crate::types::identifiers::{RequestId, ToolName};

#[derive(Debug)]
enum Gate {
    /// Waiting on a permission request; results are held in arrival order
    Awaiting {
        request_id: RequestId,
        held: Vec<StreamEvent>,
    },
    /// Permission was denied; the agent's own result is replaced
    Refused,
}

/// Per-session tool bookkeeping for the adapter task
#[derive(Debug, Default)]
pub(super) struct ToolGate {
    names: HashMap<String, ToolName>,
    open_calls: Vec<String>,
    gates: HashMap<String, Gate>,
}

/// What releasing a request produced
pub(super) enum Release {
    /// The request guarded no known tool use
    Unguarded,
    /// Allowed: emit these held results now
    Allowed(Vec<StreamEvent>),
    /// Denied: the guarded tool use gets a denial result
    Denied {
        tool_use_id: String,
        tool_name: Option<ToolName>,
    },
}

impl ToolGate {
    /// Remember a tool call
    pub(super) fn record_call(&mut self, tool_use_id: &str, tool_name: &ToolName) {
        self.names
            .insert(tool_use_id.to_string(), tool_name.clone());
        self.open_calls.push(tool_use_id.to_string());
    }

    /// Tool name of a recorded call
    pub(super) fn tool_name(&self, tool_use_id: &str) -> Option<ToolName> {
        self.names.get(tool_use_id).cloned()
    }

    /// Tool use a permission request guards: the explicit id, else the most
    /// recent call of the same tool that has no result yet
    pub(super) fn guarded_tool_use(
        &self,
        explicit: Option<String>,
        tool_name: &ToolName,
    ) -> Option<String> {
        explicit.or_else(|| {
            self.open_calls
                .iter()
                .rev()
                .find(|id| self.names.get(id.as_str()) == Some(tool_name))
                .cloned()
        })
    }

    /// Start holding results of `tool_use_id` until `request_id` resolves
    pub(super) fn hold(&mut self, tool_use_id: String, request_id: RequestId) {
        self.gates.insert(
            tool_use_id,
            Gate::Awaiting {
                request_id,
                held: Vec::new(),
            },
        );
    }

    /// Suppress every later result of `tool_use_id`
    pub(super) fn refuse(&mut self, tool_use_id: String) {
        self.gates.insert(tool_use_id, Gate::Refused);
    }

    /// Pass a tool result through the gate
    ///
    /// Returns the event when it may be emitted now; held or suppressed
    /// results return `None`. Other events pass untouched.
    pub(super) fn admit(&mut self, event: StreamEvent) -> Option<StreamEvent> {
        let tool_use_id = match &event {
            StreamEvent::ToolResult { tool_use_id, .. } => tool_use_id.clone(),
            _ => return Some(event),
        };
        self.open_calls.retain(|id| *id != tool_use_id);

        match self.gates.get_mut(&tool_use_id) {
            None => Some(event),
            Some(Gate::Awaiting { held, .. }) => {
                held.push(event);
                None
            }
            Some(Gate::Refused) => {
                log::debug!("suppressing result of refused tool use {tool_use_id}");
                None
            }
        }
    }

    /// Apply the decision for `request_id`
    pub(super) fn release(&mut self, request_id: &RequestId, permitted: bool) -> Release {
        let Some(tool_use_id) = self.gates.iter().find_map(|(id, gate)| match gate {
            Gate::Awaiting { request_id: r, .. } if r == request_id => Some(id.clone()),
            _ => None,
        }) else {
            return Release::Unguarded;
        };

        if permitted {
            match self.gates.remove(&tool_use_id) {
                Some(Gate::Awaiting { held, .. }) => Release::Allowed(held),
                _ => Release::Allowed(Vec::new()),
            }
        } else {
            self.gates.insert(tool_use_id.clone(), Gate::Refused);
            Release::Denied {
                tool_name: self.tool_name(&tool_use_id),
                tool_use_id,
            }
        }
    }

    /// Drop everything still held (the process is going away)
    pub(super) fn clear_held(&mut self) {
        self.gates
            .retain(|_, gate| !matches!(gate, Gate::Awaiting { .. }));
    }
}
