//! Tests for the key-value stores

use kodegen_agent_sessions::store::{ALLOW_LIST_KEY, ledger_key};
use kodegen_agent_sessions::{JsonFileStore, KeyValueStore, MemoryStore};
use serde_json::json;

#[test]
fn test_memory_store_get_set_append() {
    let store = MemoryStore::new();
    assert_eq!(store.get("missing").unwrap(), None);

    store.set("k", json!({ "a": 1 })).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(json!({ "a": 1 })));

    store.append("list", json!(1)).unwrap();
    store.append("list", json!(2)).unwrap();
    assert_eq!(store.get("list").unwrap(), Some(json!([1, 2])));

    assert!(store.append("k", json!(3)).is_err());

    assert!(store.remove("list").unwrap());
    assert!(!store.remove("list").unwrap());
    assert_eq!(store.get("list").unwrap(), None);
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");

    {
        let store = JsonFileStore::open(&path).unwrap();
        store
            .append(ALLOW_LIST_KEY, json!({ "tool_name": "Bash", "pattern": "npm i *" }))
            .unwrap();
        store
            .set(&ledger_key("s1"), json!({ "cost": "0.25" }))
            .unwrap();
    }

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.path(), path.as_path());
    assert_eq!(
        reopened.get(ALLOW_LIST_KEY).unwrap(),
        Some(json!([{ "tool_name": "Bash", "pattern": "npm i *" }]))
    );
    assert_eq!(
        reopened.get("ledger/s1").unwrap(),
        Some(json!({ "cost": "0.25" }))
    );
}

#[test]
fn test_file_store_remove_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let store = JsonFileStore::open(&path).unwrap();
        store.set(&ledger_key("s1"), json!({ "cost": "0.25" })).unwrap();
        store.set(&ledger_key("s2"), json!({ "cost": "1.00" })).unwrap();
        assert!(store.remove(&ledger_key("s1")).unwrap());
        assert!(!store.remove(&ledger_key("s1")).unwrap());
    }

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(reopened.get("ledger/s1").unwrap(), None);
    assert_eq!(reopened.get("ledger/s2").unwrap(), Some(json!({ "cost": "1.00" })));
}

#[test]
fn test_file_store_accepts_empty_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let store = JsonFileStore::open(file.path()).unwrap();
    assert_eq!(store.get(ALLOW_LIST_KEY).unwrap(), None);
}

#[test]
fn test_file_store_rejects_non_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, "[1, 2]").unwrap();
    assert!(JsonFileStore::open(&path).is_err());
}
