//! Core registry structure and lifecycle management

use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::broadcast;

use crate::adapter::{AdapterContext, AgentProcessAdapter};
use crate::bus::EventBus;
use crate::error::{Result, SessionError};
use crate::permissions::PermissionBroker;
use crate::store::KeyValueStore;
use crate::transport::ProcessLauncher;
use crate::types::events::SessionEvent;
use crate::types::identifiers::SessionId;
use crate::types::options::OrchestratorOptions;

/// Sessions in creation order plus the focus pointer
#[derive(Default)]
pub(super) struct SessionTable {
    pub(super) sessions: HashMap<SessionId, Arc<AgentProcessAdapter>>,
    pub(super) order: Vec<SessionId>,
    pub(super) focused: Option<SessionId>,
}

/// Registry of concurrent agent sessions
///
/// The `SessionRegistry` coordinates multiple agent sessions, handling:
/// - Session lifecycle (create, stop, close)
/// - Focus and routing of commands without an explicit target
/// - Permission resolution, edit modes, global bypass and the allow-list
/// - Event delivery through one shared [`EventBus`]
///
/// Every method is callable from any task; the table lock is never held
/// across an `.await`.
pub struct SessionRegistry {
    pub(super) ctx: AdapterContext,
    pub(super) table: RwLock<SessionTable>,
    pub(super) next_ordinal: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry; the allow-list is loaded from `store`
    ///
    /// # Errors
    /// Returns an error if the persisted allow-list cannot be read
    pub fn new(
        options: OrchestratorOptions,
        launcher: Arc<dyn ProcessLauncher>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let broker = Arc::new(PermissionBroker::new(Arc::clone(&store))?);
        let bus = EventBus::new(options.event_capacity);
        log::info!(
            "session registry ready ({} allow rule(s) loaded)",
            broker.allow_list().rules().len()
        );

        Ok(Self {
            ctx: AdapterContext {
                options: Arc::new(options),
                launcher,
                broker,
                store,
                bus,
            },
            table: RwLock::new(SessionTable::default()),
            next_ordinal: AtomicU64::new(1),
        })
    }

    /// The shared permission broker
    #[must_use]
    pub fn broker(&self) -> &Arc<PermissionBroker> {
        &self.ctx.broker
    }

    /// Receive every event of every session from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.bus.subscribe()
    }

    /// [`subscribe`](Self::subscribe) as a stream
    pub fn event_stream(&self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        self.ctx.bus.stream()
    }

    /// The event bus itself, for attaching sinks
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    /// Resolve an optional target to a session id, defaulting to focus
    pub(super) fn target(&self, session_id: Option<&SessionId>) -> Result<SessionId> {
        match session_id {
            Some(id) => Ok(id.clone()),
            None => self
                .table
                .read()
                .focused
                .clone()
                .ok_or(SessionError::NoFocusedSession),
        }
    }

    /// Look up an adapter by optional target
    pub(super) fn adapter(&self, session_id: Option<&SessionId>) -> Result<Arc<AgentProcessAdapter>> {
        let id = self.target(session_id)?;
        self.table
            .read()
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| SessionError::unknown_session(id.as_str()))
    }

    /// Close every session
    ///
    /// Should be called before dropping to ensure agent processes are
    /// terminated with their terminal events emitted.
    pub async fn shutdown(&self) {
        log::info!("Shutting down session registry...");

        let session_ids: Vec<SessionId> = self.table.read().order.clone();
        for session_id in session_ids {
            log::debug!("Closing session: {session_id}");
            if let Err(e) = self.close_session(&session_id).await {
                log::warn!("Failed to close session {session_id}: {e}");
            }
        }

        log::info!("Session registry shutdown complete");
    }
}
