//! Session creation, closing and focus

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::adapter::AgentProcessAdapter;
use crate::error::{Result, SessionError};
use crate::types::identifiers::SessionId;
use crate::types::session::SessionConfig;

use super::core::SessionRegistry;

impl SessionRegistry {
    /// Create a session and spawn its agent process
    ///
    /// The new session takes focus. A process that fails to start still
    /// registers the session, in the `error` state.
    pub fn create_session(&self, config: SessionConfig) -> SessionId {
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let name = config
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Agent {ordinal}"));
        let session_id = SessionId::generate();

        let adapter = AgentProcessAdapter::start(session_id.clone(), name.clone(), &config, &self.ctx);

        let mut table = self.table.write();
        table
            .sessions
            .insert(session_id.clone(), Arc::new(adapter));
        table.order.push(session_id.clone());
        table.focused = Some(session_id.clone());
        drop(table);

        log::info!("[{session_id}] created session \"{name}\"");
        session_id
    }

    /// Close a session: deny its pending requests, stop its process and
    /// remove it from the focus rotation
    ///
    /// Closing the focused session moves focus to the next session in
    /// creation order, else the previous one, else none.
    ///
    /// # Errors
    /// `UnknownSession` if the id is not registered
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let adapter = {
            let mut table = self.table.write();
            let adapter = table
                .sessions
                .remove(session_id)
                .ok_or_else(|| SessionError::unknown_session(session_id.as_str()))?;

            if let Some(pos) = table.order.iter().position(|id| id == session_id) {
                table.order.remove(pos);
                if table.focused.as_ref() == Some(session_id) {
                    let neighbour = table
                        .order
                        .get(pos)
                        .or_else(|| pos.checked_sub(1).and_then(|prev| table.order.get(prev)))
                        .cloned();
                    table.focused = neighbour;
                }
            }
            adapter
        };

        adapter.dispose().await;
        Ok(())
    }

    /// Give focus to a session; other sessions keep running
    ///
    /// # Errors
    /// `UnknownSession` if the id is not registered
    pub fn focus_session(&self, session_id: &SessionId) -> Result<()> {
        let mut table = self.table.write();
        if !table.sessions.contains_key(session_id) {
            return Err(SessionError::unknown_session(session_id.as_str()));
        }
        table.focused = Some(session_id.clone());
        log::debug!("[{session_id}] focused");
        Ok(())
    }

    /// Currently focused session, if any
    #[must_use]
    pub fn focused_session(&self) -> Option<SessionId> {
        self.table.read().focused.clone()
    }
}
