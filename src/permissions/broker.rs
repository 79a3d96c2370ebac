//! Permission Broker
//!
//! Tracks every permission request per session, applies the auto-approval
//! policy, and resolves each request exactly once. The adapter owning a
//! session registers its command channel here so user decisions reach it.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::adapter::commands::AdapterCommand;
use crate::error::{Result, SessionError};
use crate::store::KeyValueStore;
use crate::types::identifiers::{RequestId, SessionId, ToolName};
use crate::types::permissions::{
    AllowRule, EditMode, PermissionDecision, PermissionState, Resolution,
};

use super::allow_list::{AllowList, derive_rule};

/// Why a request was decided without asking the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoReason {
    /// Global bypass is on
    Bypass,
    /// Session is in `auto` mode
    AutoMode,
    /// Session is in `plan` mode
    PlanMode,
    /// An allow-list rule covers the invocation
    AllowList,
}

impl AutoReason {
    /// Message shown to the agent when the reason denies a tool
    #[must_use]
    pub const fn deny_message(self) -> &'static str {
        match self {
            Self::PlanMode => "Plan mode is active: tools are not executed while planning",
            _ => "Tool call denied",
        }
    }
}

/// Outcome of the decision algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Decided by policy
    Automatic {
        /// The decision taken
        decision: PermissionDecision,
        /// Which policy step decided
        reason: AutoReason,
    },
    /// Needs an explicit user decision
    Pending,
}

#[derive(Debug)]
struct RequestEntry {
    state: PermissionState,
    tool_name: ToolName,
    input: Value,
    tool_use_id: Option<String>,
}

type RequestKey = (SessionId, RequestId);

/// Shared permission state for every session
pub struct PermissionBroker {
    bypass: AtomicBool,
    allow_list: AllowList,
    requests: Mutex<HashMap<RequestKey, RequestEntry>>,
    routes: Mutex<HashMap<SessionId, mpsc::UnboundedSender<AdapterCommand>>>,
}

impl PermissionBroker {
    /// Create a broker whose allow-list lives in `store`
    ///
    /// # Errors
    /// Returns an error if the persisted allow-list cannot be read
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        Ok(Self {
            bypass: AtomicBool::new(false),
            allow_list: AllowList::load(store)?,
            requests: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
        })
    }

    // ------------------------------------------------------------------------
    // Policy
    // ------------------------------------------------------------------------

    /// Toggle global bypass; requests already pending are unaffected
    pub fn set_bypass(&self, enabled: bool) {
        self.bypass.store(enabled, Ordering::SeqCst);
        log::info!("global bypass {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether global bypass is on
    #[must_use]
    pub fn bypass(&self) -> bool {
        self.bypass.load(Ordering::SeqCst)
    }

    /// The allow-list consulted by [`evaluate`](Self::evaluate)
    #[must_use]
    pub const fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Add a rule to the allow-list
    ///
    /// # Errors
    /// Returns an error if the store append fails
    pub fn add_allow_rule(&self, rule: AllowRule) -> Result<bool> {
        self.allow_list.add(rule)
    }

    /// Run the decision algorithm; first match wins
    #[must_use]
    pub fn evaluate(&self, mode: EditMode, tool_name: &ToolName, input: &Value) -> Evaluation {
        let automatic = |decision, reason| Evaluation::Automatic { decision, reason };

        if self.bypass() {
            return automatic(PermissionDecision::Allowed, AutoReason::Bypass);
        }
        match mode {
            EditMode::Auto => automatic(PermissionDecision::Allowed, AutoReason::AutoMode),
            EditMode::Plan => automatic(PermissionDecision::Denied, AutoReason::PlanMode),
            EditMode::Ask => match self.allow_list.find_match(tool_name, input) {
                Some(rule) => {
                    log::debug!("{tool_name} covered by allow rule {rule}");
                    automatic(PermissionDecision::Allowed, AutoReason::AllowList)
                }
                None => Evaluation::Pending,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Adapter routes
    // ------------------------------------------------------------------------

    /// Register the command channel of a session's adapter
    pub fn attach(&self, session_id: SessionId, commands: mpsc::UnboundedSender<AdapterCommand>) {
        self.routes.lock().insert(session_id, commands);
    }

    /// Drop the route to a session's adapter
    pub fn detach(&self, session_id: &SessionId) {
        self.routes.lock().remove(session_id);
    }

    // ------------------------------------------------------------------------
    // Request table
    // ------------------------------------------------------------------------

    /// Whether `request_id` was already issued for this session
    #[must_use]
    pub fn is_known(&self, session_id: &SessionId, request_id: &RequestId) -> bool {
        self.requests
            .lock()
            .contains_key(&(session_id.clone(), request_id.clone()))
    }

    /// Pending request guarding `tool_use_id`, if any
    #[must_use]
    pub fn pending_for_tool_use(
        &self,
        session_id: &SessionId,
        tool_use_id: &str,
    ) -> Option<RequestId> {
        self.requests
            .lock()
            .iter()
            .find(|((sid, _), entry)| {
                sid == session_id
                    && entry.state == PermissionState::Pending
                    && entry.tool_use_id.as_deref() == Some(tool_use_id)
            })
            .map(|((_, rid), _)| rid.clone())
    }

    /// Record a request decided by policy
    pub fn record_automatic(
        &self,
        session_id: &SessionId,
        request_id: RequestId,
        tool_name: ToolName,
        input: Value,
        tool_use_id: Option<String>,
        decision: PermissionDecision,
    ) {
        self.requests.lock().insert(
            (session_id.clone(), request_id),
            RequestEntry {
                state: PermissionState::Resolved(decision),
                tool_name,
                input,
                tool_use_id,
            },
        );
    }

    /// Open a request awaiting the user
    pub fn open(
        &self,
        session_id: &SessionId,
        request_id: RequestId,
        tool_name: ToolName,
        input: Value,
        tool_use_id: Option<String>,
    ) {
        self.requests.lock().insert(
            (session_id.clone(), request_id),
            RequestEntry {
                state: PermissionState::Pending,
                tool_name,
                input,
                tool_use_id,
            },
        );
    }

    /// Current state of a request
    #[must_use]
    pub fn state(&self, session_id: &SessionId, request_id: &RequestId) -> Option<PermissionState> {
        self.requests
            .lock()
            .get(&(session_id.clone(), request_id.clone()))
            .map(|entry| entry.state)
    }

    /// Tool input of a request, used when answering the agent
    #[must_use]
    pub fn input(&self, session_id: &SessionId, request_id: &RequestId) -> Option<Value> {
        self.requests
            .lock()
            .get(&(session_id.clone(), request_id.clone()))
            .map(|entry| entry.input.clone())
    }

    /// Number of requests still pending for a session
    #[must_use]
    pub fn pending_count(&self, session_id: &SessionId) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|((sid, _), entry)| sid == session_id && entry.state == PermissionState::Pending)
            .count()
    }

    /// Apply a user decision
    ///
    /// The pending → terminal transition happens at most once; later calls
    /// report [`Resolution::AlreadyResolved`] and change nothing.
    ///
    /// # Errors
    /// - `UnknownRequest` if the session never issued `request_id`
    /// - `NotRunning` if the request is pending but its adapter is gone
    pub fn resolve(
        &self,
        session_id: &SessionId,
        request_id: &RequestId,
        decision: PermissionDecision,
    ) -> Result<Resolution> {
        let key = (session_id.clone(), request_id.clone());
        let (tool_name, input) = {
            let mut requests = self.requests.lock();
            let entry = requests.get_mut(&key).ok_or_else(|| {
                SessionError::unknown_request(session_id.as_str(), request_id.as_str())
            })?;

            if let PermissionState::Resolved(previous) = entry.state {
                log::debug!("[{session_id}] {request_id} already resolved as {previous:?}");
                return Ok(Resolution::AlreadyResolved(previous));
            }

            // The state only changes once the adapter has the decision; a
            // request whose adapter is already draining stays pending for
            // the force-deny
            let routes = self.routes.lock();
            let delivered = routes.get(session_id).is_some_and(|route| {
                route
                    .send(AdapterCommand::ApplyDecision {
                        request_id: request_id.clone(),
                        decision,
                    })
                    .is_ok()
            });
            if !delivered {
                log::warn!("[{session_id}] no running adapter to receive {request_id}");
                return Err(SessionError::not_running(session_id.as_str()));
            }
            entry.state = PermissionState::Resolved(decision);
            (entry.tool_name.clone(), entry.input.clone())
        };

        log::info!("[{session_id}] {request_id} ({tool_name}) resolved as {decision:?}");

        if decision == PermissionDecision::AllowedAlways {
            let rule = derive_rule(&tool_name, &input);
            if let Err(e) = self.allow_list.add(rule) {
                log::error!("[{session_id}] failed to persist allow rule: {e}");
            }
        }

        Ok(Resolution::Resolved(decision))
    }

    /// Deny every pending request of a session; returns the denied ids
    #[must_use]
    pub fn force_deny_session(&self, session_id: &SessionId) -> Vec<RequestId> {
        let mut denied: Vec<RequestId> = self
            .requests
            .lock()
            .iter_mut()
            .filter(|((sid, _), entry)| sid == session_id && entry.state == PermissionState::Pending)
            .map(|((_, rid), entry)| {
                entry.state = PermissionState::Resolved(PermissionDecision::Denied);
                rid.clone()
            })
            .collect();
        denied.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        if !denied.is_empty() {
            log::info!("[{session_id}] force-denied {} pending request(s)", denied.len());
        }
        denied
    }

    /// Remove every trace of a closed session
    pub fn forget_session(&self, session_id: &SessionId) {
        self.requests.lock().retain(|(sid, _), _| sid != session_id);
        self.detach(session_id);
    }
}
