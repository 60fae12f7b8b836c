//! Store connection identity.
//!
//! Every key that is namespaced per store (conditionals, the environment
//! hash, the session file name) derives from a [`ConnectionConfig`] that is
//! passed explicitly to whatever needs it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EnnError, Result};

/// Host and port of the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

impl ConnectionConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 6379;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build a connection from an optional host/port pair.
    ///
    /// Host and port must be given together or not at all; when both are
    /// absent `fallback` is used.
    pub fn from_pair(
        host: Option<&str>,
        port: Option<u16>,
        fallback: impl FnOnce() -> Self,
    ) -> Result<Self> {
        match (host, port) {
            (Some(host), Some(port)) => Ok(Self::new(host, port)),
            (None, None) => Ok(fallback()),
            _ => Err(EnnError::ConfigInvalid(
                "db host and db port values are both required".to_string(),
            )),
        }
    }

    /// Connection URL understood by the `redis` crate.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    /// Hash key holding free-form environment values for this store.
    pub fn env_key(&self) -> String {
        format!("machinic:env:{}:{}", self.host, self.port)
    }

    /// File name of the session snapshot for this store.
    pub fn session_file_name(&self) -> String {
        let host: String = self
            .host
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("session_{host}_{}.xml", self.port)
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
