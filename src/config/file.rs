//! Optional TOML configuration file.
//!
//! # Example
//!
//! ```toml
//! db_host = "10.0.0.5"
//! db_port = 6379
//! session_dir = "~/enn/sessions"
//! poll_interval_ms = 500
//! debounce_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::connection::ConnectionConfig;
use super::path::{default_config_path, default_session_dir, resolve_path};
use crate::error::{EnnError, Result};

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_USB_ROOT: &str = "/sys/bus/usb/devices";
const DEFAULT_GPHOTO2: &str = "gphoto2";

/// Contents of `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub session_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub usb_root: Option<PathBuf>,
    pub gphoto2: Option<String>,
}

impl ConfigFile {
    /// Parse config file contents.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EnnError::ConfigParse(e.to_string()))
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. The default location is optional and a
    /// missing file there yields the defaults.
    #[instrument(skip_all)]
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Ok(path) => (path, false),
                Err(_) => return Ok((Self::default(), None)),
            },
        };

        if !path.exists() {
            if required {
                return Err(EnnError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok((Self::default(), None));
        }

        let contents = std::fs::read_to_string(&path)?;
        let file = Self::parse(&contents)?;
        info!(path = %path.display(), "Loaded config file");
        Ok((file, Some(path)))
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub session_dir: PathBuf,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub usb_root: PathBuf,
    pub gphoto2: String,
    /// Path the config file was read from, if any.
    pub config_path: Option<PathBuf>,
}

impl Settings {
    /// Merge CLI values over the config file over defaults.
    ///
    /// `host`/`port` come from the command line (or its environment
    /// variables) and must be paired.
    pub fn resolve(
        file: &ConfigFile,
        config_path: Option<PathBuf>,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self> {
        let connection = ConnectionConfig::from_pair(host, port, || {
            ConnectionConfig::new(
                file.db_host
                    .clone()
                    .unwrap_or_else(|| ConnectionConfig::DEFAULT_HOST.to_string()),
                file.db_port.unwrap_or(ConnectionConfig::DEFAULT_PORT),
            )
        })?;

        let base_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let session_dir = match &file.session_dir {
            Some(dir) => resolve_path(dir, &base_dir)?,
            None => default_session_dir()?,
        };

        Ok(Self {
            connection,
            session_dir,
            poll_interval: Duration::from_millis(
                file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            debounce: Duration::from_millis(file.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS)),
            usb_root: file
                .usb_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_USB_ROOT)),
            gphoto2: file
                .gphoto2
                .clone()
                .unwrap_or_else(|| DEFAULT_GPHOTO2.to_string()),
            config_path,
        })
    }

    /// Path of the session file for the configured store.
    pub fn session_path(&self) -> PathBuf {
        self.session_dir.join(self.connection.session_file_name())
    }
}
