//! Redis-backed settings store.

use std::collections::BTreeMap;
use std::time::Duration;

use redis::{Commands, Connection};
use tracing::{debug, info, instrument, warn};

use super::SettingsStore;
use crate::config::ConnectionConfig;
use crate::error::{EnnError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

fn store_err(e: redis::RedisError) -> EnnError {
    EnnError::Store(e.to_string())
}

/// Open a connection, mapping failures to [`EnnError::StoreConnection`].
pub(crate) fn connect(config: &ConnectionConfig) -> Result<Connection> {
    let fail = |e: redis::RedisError| EnnError::StoreConnection {
        host: config.host.clone(),
        port: config.port,
        reason: e.to_string(),
    };
    let client = redis::Client::open(config.url()).map_err(fail)?;
    client
        .get_connection_with_timeout(CONNECT_TIMEOUT)
        .map_err(fail)
}

/// [`SettingsStore`] over a synchronous Redis connection.
pub struct RedisStore {
    conn: Connection,
    config: ConnectionConfig,
}

impl RedisStore {
    /// Connect to the store described by `config`.
    #[instrument(skip_all, fields(store = %config))]
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = connect(config)?;
        info!("Connected to settings store");
        Ok(Self {
            conn,
            config: config.clone(),
        })
    }

    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Round-trip a PING.
    pub fn ping(&mut self) -> Result<()> {
        redis::cmd("PING")
            .query::<String>(&mut self.conn)
            .map(|_| ())
            .map_err(store_err)
    }

    /// Ask the server to publish keyspace notifications.
    ///
    /// Managed servers often refuse CONFIG; that is logged, not fatal.
    pub fn enable_keyspace_events(&mut self) -> Result<()> {
        let current: Vec<String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg("notify-keyspace-events")
            .query(&mut self.conn)
            .map_err(store_err)?;
        let flags = current.get(1).map_or("", String::as_str);
        if flags.contains('K') && (flags.contains('A') || flags.contains('h')) {
            debug!(flags, "Keyspace notifications already enabled");
            return Ok(());
        }

        match redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("KA")
            .query::<()>(&mut self.conn)
        {
            Ok(()) => {
                info!("Enabled keyspace notifications");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Could not enable keyspace notifications");
                Err(store_err(e))
            }
        }
    }
}

impl SettingsStore for RedisStore {
    fn hash_get_all(&mut self, key: &str) -> Result<BTreeMap<String, String>> {
        self.conn.hgetall(key).map_err(store_err)
    }

    fn hash_get(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        self.conn.hget(key, field).map_err(store_err)
    }

    fn hash_set(&mut self, key: &str, field: &str, value: &str) -> Result<()> {
        self.conn
            .hset::<_, _, _, ()>(key, field, value)
            .map_err(store_err)
    }

    fn hash_set_all(&mut self, key: &str, fields: &BTreeMap<String, String>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.conn
            .hset_multiple::<_, _, _, ()>(key, items.as_slice())
            .map_err(store_err)
    }

    fn hash_delete(&mut self, key: &str, field: &str) -> Result<()> {
        self.conn.hdel::<_, _, ()>(key, field).map_err(store_err)
    }

    fn list_push(&mut self, key: &str, values: &[String]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.conn.rpush::<_, _, ()>(key, values).map_err(store_err)
    }

    fn list_range(&mut self, key: &str) -> Result<Vec<String>> {
        self.conn.lrange(key, 0, -1).map_err(store_err)
    }

    fn set_bytes(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.set::<_, _, ()>(key, value).map_err(store_err)
    }

    fn delete(&mut self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.conn.del::<_, ()>(keys).map_err(store_err)
    }

    fn exists(&mut self, key: &str) -> Result<bool> {
        self.conn.exists(key).map_err(store_err)
    }

    fn scan(&mut self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .conn
            .scan_match::<_, String>(pattern)
            .map_err(store_err)?
            .collect();
        // SCAN may repeat keys across cursor steps
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
