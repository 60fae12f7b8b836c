//! Configuration: store connection identity, the optional TOML config file,
//! and path helpers.

mod connection;
mod file;
mod path;

pub use connection::ConnectionConfig;
pub use file::{ConfigFile, Settings};
pub use path::{default_config_path, default_session_dir, home_dir, resolve_path};
