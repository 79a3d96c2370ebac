//! Session listing functionality

use crate::adapter::AgentProcessAdapter;
use crate::error::{Result, SessionError};
use crate::types::identifiers::SessionId;
use crate::types::session::AgentSessionSummary;

use super::core::SessionRegistry;

impl SessionRegistry {
    /// Summaries of every session, in creation order
    #[must_use]
    pub fn list_sessions(&self) -> Vec<AgentSessionSummary> {
        let table = self.table.read();
        table
            .order
            .iter()
            .filter_map(|id| table.sessions.get(id))
            .map(|adapter| self.summarize(adapter, table.focused.as_ref()))
            .collect()
    }

    /// Summary of one session
    ///
    /// # Errors
    /// `UnknownSession` if the id is not registered
    pub fn session_summary(&self, session_id: &SessionId) -> Result<AgentSessionSummary> {
        let table = self.table.read();
        let adapter = table
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::unknown_session(session_id.as_str()))?;
        Ok(self.summarize(adapter, table.focused.as_ref()))
    }

    fn summarize(
        &self,
        adapter: &AgentProcessAdapter,
        focused: Option<&SessionId>,
    ) -> AgentSessionSummary {
        let session_id = adapter.session_id().clone();
        let status = adapter.status();
        AgentSessionSummary {
            pending_permissions: self.ctx.broker.pending_count(&session_id),
            focused: focused == Some(&session_id),
            session_id,
            name: status.name,
            state: status.state,
            edit_mode: status.edit_mode,
            model: status.model,
            cost: status.cost,
            last_activity: status.last_activity,
            task_summary: status.task_summary,
            has_process: status.has_process,
        }
    }
}
