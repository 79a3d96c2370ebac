//! Persistent key-value store for the allow-list and cost ledgers
//!
//! The contract is small: `get`, `set`, `append` and `remove`, with
//! last-writer-wins per key and no transactions. Values are JSON.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde_json::Value;

use crate::error::{Result, SessionError};

/// Store key holding the allow-list rules
pub const ALLOW_LIST_KEY: &str = "allow_list";

/// Store key holding one session's cost ledger
#[must_use]
pub fn ledger_key(session_id: &str) -> String {
    format!("ledger/{session_id}")
}

/// Get/set/append store shared by every session
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Replace a value
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written
    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Push `item` onto the array stored at `key`, creating it if missing
    ///
    /// # Errors
    /// Returns an error if the key holds a non-array value or storage fails
    fn append(&self, key: &str, item: Value) -> Result<()>;

    /// Delete a key; returns whether it was present
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Append into a map slot, shared by the store implementations
fn append_into(slot: &mut Value, key: &str, item: Value) -> Result<()> {
    match slot {
        Value::Null => {
            *slot = Value::Array(vec![item]);
            Ok(())
        }
        Value::Array(items) => {
            items.push(item);
            Ok(())
        }
        _ => Err(SessionError::store(format!(
            "cannot append to non-array value at `{key}`"
        ))),
    }
}
