//! In-memory store

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

use super::{KeyValueStore, append_into};

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn append(&self, key: &str, item: Value) -> Result<()> {
        let mut entries = self.entries.lock();
        let slot = entries.entry(key.to_string()).or_insert(Value::Null);
        append_into(slot, key, item)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
