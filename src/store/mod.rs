//! Settings store abstraction.
//!
//! The store is a flat key-value namespace holding hashes, lists and binary
//! blobs. [`RedisStore`] talks to a real server; [`MemoryStore`] keeps
//! everything in process so the rest of the crate can be tested without one.
//!
//! Key-space change notifications are delivered separately by
//! [`KeyspaceListener`].

mod listener;
pub mod memory;
mod redis_store;

pub use listener::{keyspace_key, KeyspaceListener, KEYSPACE_PATTERN};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::collections::BTreeMap;

use crate::error::Result;

/// Operations the crate needs from the settings store.
///
/// Reads of missing keys return empty values rather than errors, matching
/// the store's own semantics.
pub trait SettingsStore {
    /// All fields of a hash (empty when the key does not exist).
    fn hash_get_all(&mut self, key: &str) -> Result<BTreeMap<String, String>>;

    /// One field of a hash.
    fn hash_get(&mut self, key: &str, field: &str) -> Result<Option<String>>;

    /// Set one field of a hash.
    fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Set several fields of a hash. Does nothing for an empty map.
    fn hash_set_all(&mut self, key: &str, fields: &BTreeMap<String, String>) -> Result<()> {
        for (field, value) in fields {
            self.hash_set(key, field, value)?;
        }
        Ok(())
    }

    /// Remove one field of a hash.
    fn hash_delete(&mut self, key: &str, field: &str) -> Result<()>;

    /// Append values to the tail of a list. Does nothing for an empty slice.
    fn list_push(&mut self, key: &str, values: &[String]) -> Result<()>;

    /// Whole list, head to tail (empty when the key does not exist).
    fn list_range(&mut self, key: &str) -> Result<Vec<String>>;

    /// Store a binary value under a plain key.
    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete keys. Missing keys are ignored.
    fn delete(&mut self, keys: &[String]) -> Result<()>;

    /// Whether a key exists.
    fn exists(&mut self, key: &str) -> Result<bool>;

    /// Keys matching a glob pattern, sorted.
    fn scan(&mut self, pattern: &str) -> Result<Vec<String>>;
}

/// Escape glob metacharacters so `text` matches only itself in a pattern.
pub fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Match `text` against a store glob pattern.
///
/// Supports `*`, `?` and backslash escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it is currently covering.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }
        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
