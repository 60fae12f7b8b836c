//! In-process settings store for tests and offline use.
//!
//! Behaves like the real store for the commands the crate uses (missing keys
//! read as empty, type mismatches are errors), records every write for
//! assertions, and can emit keyspace-style [`Event::KeyChanged`]
//! notifications.
//!
//! # Example
//!
//! ```rust,ignore
//! use enn::store::{MemoryStore, SettingsStore};
//! use enn::store::memory::StoreOp;
//!
//! let mut store = MemoryStore::new();
//! store.hash_set("machinic:env:127.0.0.1:6379", "mode", "day").unwrap();
//! assert_eq!(store.operations(), vec![StoreOp::HashSet {
//!     key: "machinic:env:127.0.0.1:6379".into(),
//!     field: "mode".into(),
//! }]);
//! ```

use std::collections::BTreeMap;

use tracing::trace;

use super::{glob_match, SettingsStore};
use crate::error::{EnnError, Result};
use crate::events::{Event, EventSender};

/// Recorded write for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    HashSet { key: String, field: String },
    HashDelete { key: String, field: String },
    ListPush { key: String, count: usize },
    SetBytes { key: String, len: usize },
    Delete { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Bytes(Vec<u8>),
}

impl Value {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Hash(_) => "hash",
            Self::List(_) => "list",
            Self::Bytes(_) => "string",
        }
    }
}

fn wrong_type(key: &str, found: &Value) -> EnnError {
    EnnError::Store(format!(
        "WRONGTYPE operation against key '{key}' holding a {}",
        found.kind()
    ))
}

/// In-memory [`SettingsStore`].
#[derive(Default)]
pub struct MemoryStore {
    data: BTreeMap<String, Value>,
    operation_log: Vec<StoreOp>,
    notifier: Option<EventSender>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit [`Event::KeyChanged`] for every modified key.
    #[must_use]
    pub fn with_notifier(mut self, sender: EventSender) -> Self {
        self.notifier = Some(sender);
        self
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Binary value stored under `key`.
    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.data.get(key) {
            Some(Value::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Writes performed so far.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operation_log.clone()
    }

    pub fn clear_operations(&mut self) {
        self.operation_log.clear();
    }

    fn record(&mut self, op: StoreOp, key: &str) {
        trace!(?op, "Memory store write");
        self.operation_log.push(op);
        if let Some(tx) = &self.notifier {
            let _ = tx.send(Event::KeyChanged(key.to_string()));
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut BTreeMap<String, String>> {
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(BTreeMap::new()));
        match value {
            Value::Hash(map) => Ok(map),
            other => Err(wrong_type(key, other)),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn hash_get_all(&mut self, key: &str) -> Result<BTreeMap<String, String>> {
        match self.data.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Hash(map)) => Ok(map.clone()),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn hash_get(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hash_get_all(key)?.remove(field))
    }

    fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hash_mut(key)?
            .insert(field.to_string(), value.to_string());
        self.record(
            StoreOp::HashSet {
                key: key.to_string(),
                field: field.to_string(),
            },
            key,
        );
        Ok(())
    }

    fn hash_delete(&mut self, key: &str, field: &str) -> Result<()> {
        let emptied = match self.data.get_mut(key) {
            None => return Ok(()),
            Some(Value::Hash(map)) => {
                map.remove(field);
                map.is_empty()
            }
            Some(other) => return Err(wrong_type(key, other)),
        };
        // The store drops hashes once their last field is gone.
        if emptied {
            self.data.remove(key);
        }
        self.record(
            StoreOp::HashDelete {
                key: key.to_string(),
                field: field.to_string(),
            },
            key,
        );
        Ok(())
    }

    fn list_push(&mut self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        match value {
            Value::List(list) => list.extend(values.iter().cloned()),
            other => return Err(wrong_type(key, other)),
        }
        self.record(
            StoreOp::ListPush {
                key: key.to_string(),
                count: values.len(),
            },
            key,
        );
        Ok(())
    }

    fn list_range(&mut self, key: &str) -> Result<Vec<String>> {
        match self.data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(list)) => Ok(list.clone()),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.data
            .insert(key.to_string(), Value::Bytes(value.to_vec()));
        self.record(
            StoreOp::SetBytes {
                key: key.to_string(),
                len: value.len(),
            },
            key,
        );
        Ok(())
    }

    fn delete(&mut self, keys: &[String]) -> Result<()> {
        for key in keys {
            if self.data.remove(key).is_some() {
                self.record(StoreOp::Delete { key: key.clone() }, key);
            }
        }
        Ok(())
    }

    fn exists(&mut self, key: &str) -> Result<bool> {
        Ok(self.data.contains_key(key))
    }

    fn scan(&mut self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }
}
