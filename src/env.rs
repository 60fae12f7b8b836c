//! Free-form environment values shared through the store.
//!
//! Stored as one hash per store at `machinic:env:<host>:<port>`.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::store::SettingsStore;

/// All environment values.
pub fn values(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
) -> Result<BTreeMap<String, String>> {
    store.hash_get_all(&conn.env_key())
}

/// Create or update one value.
pub fn set(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
    field: &str,
    value: &str,
) -> Result<()> {
    debug!(field, value, "Setting environment value");
    store.hash_set(&conn.env_key(), field, value)
}

/// Remove one value.
pub fn remove(store: &mut dyn SettingsStore, conn: &ConnectionConfig, field: &str) -> Result<()> {
    debug!(field, "Removing environment value");
    store.hash_delete(&conn.env_key(), field)
}
