//! Session interaction methods
//!
//! Messages, stops, permission decisions, edit modes and allow-list rules.

use std::path::PathBuf;

use crate::error::Result;
use crate::types::identifiers::{RequestId, SessionId, ToolName};
use crate::types::permissions::{AllowRule, EditMode, PermissionDecision, Resolution};

use super::core::SessionRegistry;

impl SessionRegistry {
    /// Send a turn to a session (the focused one when `session_id` is `None`)
    ///
    /// Returns once the agent accepted the write; replies arrive as events.
    ///
    /// # Errors
    /// `UnknownSession`, `NoFocusedSession`, or `NotRunning` when the session
    /// has no live process
    pub async fn send_message(
        &self,
        session_id: Option<&SessionId>,
        text: impl Into<String>,
        attachments: Vec<PathBuf>,
    ) -> Result<()> {
        let adapter = self.adapter(session_id)?;
        adapter.send(text, attachments).await
    }

    /// Stop a session's agent process
    ///
    /// The session stays registered and can be closed afterwards.
    ///
    /// # Errors
    /// `UnknownSession`, `NoFocusedSession`, or `Timeout` when the process
    /// did not stop in time
    pub async fn stop_session(&self, session_id: Option<&SessionId>) -> Result<()> {
        let adapter = self.adapter(session_id)?;
        adapter.stop().await
    }

    /// Resolve a pending permission request
    ///
    /// A repeated resolution returns [`Resolution::AlreadyResolved`] and
    /// changes nothing.
    ///
    /// # Errors
    /// `UnknownSession`, `UnknownRequest`, or `NotRunning` when the request
    /// is still pending but the process is gone
    pub fn resolve_permission(
        &self,
        session_id: &SessionId,
        request_id: &RequestId,
        decision: PermissionDecision,
    ) -> Result<Resolution> {
        let adapter = self.adapter(Some(session_id))?;
        adapter.resolve_permission(request_id, decision)
    }

    /// Change a session's edit mode
    ///
    /// Applies to permission requests and turns that arrive afterwards.
    ///
    /// # Errors
    /// `UnknownSession` or `NoFocusedSession`
    pub fn set_edit_mode(&self, session_id: Option<&SessionId>, mode: EditMode) -> Result<()> {
        let adapter = self.adapter(session_id)?;
        adapter.set_edit_mode(mode);
        Ok(())
    }

    /// Toggle global bypass for every session
    pub fn set_global_bypass(&self, enabled: bool) {
        self.ctx.broker.set_bypass(enabled);
    }

    /// Whether global bypass is on
    #[must_use]
    pub fn global_bypass(&self) -> bool {
        self.ctx.broker.bypass()
    }

    /// Add a persistent allow-list rule; returns `false` if it already existed
    ///
    /// # Errors
    /// Returns an error if the store append fails
    pub fn add_allow_rule(&self, tool_name: ToolName, pattern: Option<String>) -> Result<bool> {
        let rule = match pattern.filter(|p| !p.trim().is_empty()) {
            Some(pattern) => AllowRule::with_pattern(tool_name, pattern),
            None => AllowRule::tool(tool_name),
        };
        self.ctx.broker.add_allow_rule(rule)
    }

    /// Every allow-list rule, in insertion order
    #[must_use]
    pub fn list_allow_rules(&self) -> Vec<AllowRule> {
        self.ctx.broker.allow_list().rules()
    }
}
