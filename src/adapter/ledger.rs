//! Cost ledger persistence
//!
//! Store writes are blocking (the file store rewrites its whole file), so
//! they run on the blocking pool. Updates coalesce: while one write is in
//! flight only the newest pending ledger is kept, and a single flusher
//! applies operations in order so the last update always lands last.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::store::{KeyValueStore, ledger_key};
use crate::types::identifiers::SessionId;

enum LedgerOp {
    Write(Value),
    Remove,
}

#[derive(Default)]
struct LedgerState {
    next: Option<LedgerOp>,
    flusher: Option<JoinHandle<()>>,
    discarded: bool,
}

/// Write-behind handle for one session's `ledger/<id>` entry
pub(crate) struct Ledger {
    session_id: SessionId,
    key: String,
    store: Arc<dyn KeyValueStore>,
    state: Arc<Mutex<LedgerState>>,
}

impl Ledger {
    pub(crate) fn new(session_id: SessionId, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            key: ledger_key(session_id.as_str()),
            session_id,
            store,
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Queue `ledger` as the session's latest totals
    pub(crate) fn record(&self, ledger: Value) {
        let mut state = self.state.lock();
        if state.discarded {
            return;
        }
        state.next = Some(LedgerOp::Write(ledger));
        self.ensure_flusher(&mut state);
    }

    /// Drop the session's entry; returns once the store no longer holds it
    ///
    /// Updates recorded afterwards are ignored.
    pub(crate) async fn discard(&self) {
        let flusher = {
            let mut state = self.state.lock();
            state.discarded = true;
            state.next = Some(LedgerOp::Remove);
            self.ensure_flusher(&mut state);
            state.flusher.take()
        };
        if let Some(flusher) = flusher {
            if let Err(e) = flusher.await {
                log::warn!("[{}] ledger flusher failed: {e}", self.session_id);
            }
        }
    }

    fn ensure_flusher(&self, state: &mut LedgerState) {
        if state.flusher.is_some() {
            return;
        }
        let store = Arc::clone(&self.store);
        let shared = Arc::clone(&self.state);
        let key = self.key.clone();
        let session_id = self.session_id.clone();
        state.flusher = Some(tokio::task::spawn_blocking(move || {
            loop {
                let op = {
                    let mut state = shared.lock();
                    match state.next.take() {
                        Some(op) => op,
                        None => {
                            state.flusher = None;
                            return;
                        }
                    }
                };
                let outcome = match op {
                    LedgerOp::Write(ledger) => store.set(&key, ledger),
                    LedgerOp::Remove => store.remove(&key).map(|_| ()),
                };
                if let Err(e) = outcome {
                    log::warn!("[{session_id}] failed to update cost ledger: {e}");
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    async fn settled(store: &MemoryStore, key: &str, expected: Option<Value>) {
        for _ in 0..200 {
            if store.get(key).unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ledger never reached {expected:?}");
    }

    #[tokio::test]
    async fn latest_update_wins() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(SessionId::new("s1"), Arc::clone(&store) as Arc<dyn KeyValueStore>);

        for cost in 1..=50 {
            ledger.record(json!({ "cost": cost }));
        }
        settled(&store, "ledger/s1", Some(json!({ "cost": 50 }))).await;
    }

    #[tokio::test]
    async fn discard_removes_and_ignores_later_updates() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(SessionId::new("s1"), Arc::clone(&store) as Arc<dyn KeyValueStore>);

        ledger.record(json!({ "cost": 1 }));
        ledger.discard().await;
        assert_eq!(store.get("ledger/s1").unwrap(), None);

        ledger.record(json!({ "cost": 2 }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("ledger/s1").unwrap(), None);
    }
}
