//! Error types for enn operations.

use thiserror::Error;

/// Primary error type for enn operations.
#[derive(Error, Debug)]
pub enum EnnError {
    // Store errors
    #[error("Failed to connect to store at {host}:{port}: {reason}")]
    StoreConnection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Store command failed: {0}")]
    Store(String),

    // Device errors
    #[error("Device not found: {uid}")]
    DeviceNotFound { uid: String },

    #[error("Discovery adapter error: {0}")]
    Adapter(String),

    #[error("'{name}' cannot be used as a setting or detail name")]
    InvalidFieldName { name: String },

    // Conditional errors
    #[error("Invalid {step} contents on line {line}: {reason}")]
    ConditionalParse {
        step: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid conditional name '{name}': {reason}")]
    InvalidConditionalName { name: String, reason: String },

    #[error("Conditional '{name}' not found for device {device}")]
    ConditionalNotFound { name: String, device: String },

    // Document errors
    #[error("Session file error: {0}")]
    SessionFormat(String),

    #[error("Reference document error: {0}")]
    ReferenceFormat(String),

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl EnnError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StoreConnection { .. }
                | Self::DeviceNotFound { .. }
                | Self::InvalidFieldName { .. }
                | Self::InvalidConditionalName { .. }
                | Self::ConditionalParse { .. }
                | Self::ConditionalNotFound { .. }
                | Self::ConfigNotFound { .. }
                | Self::ConfigInvalid(_)
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreConnection { .. } => {
                Some("Check that the store is running, or pass --db-host and --db-port")
            }
            Self::DeviceNotFound { .. } => Some("Run: enn devices"),
            Self::InvalidFieldName { .. } => Some(
                "Start names with a letter or '_' and use only letters, digits, '_', '-', '.' or ':'",
            ),
            Self::InvalidConditionalName { .. } => {
                Some("Use a non-empty conditional name without ':'")
            }
            Self::ConditionalParse { .. } => {
                Some("Use one script per line for pre/post and field=value lines for set")
            }
            Self::ConditionalNotFound { .. } => Some("Run: enn conditional list <DEVICE>"),
            Self::ConfigNotFound { .. } => Some("Check the --config path"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using EnnError.
pub type Result<T> = std::result::Result<T, EnnError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| EnnError::Other(format!("{}: {e}", f().into())))
    }
}
