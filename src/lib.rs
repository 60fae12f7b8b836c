//! enn library - camera discovery, device settings and conditional rules
//! backed by a shared settings store.
//!
//! This library exposes the core functionality of the `enn` CLI for use in
//! tests and other front ends.
//!
//! # Modules
//!
//! - `app`: Owning context tying store, adapters, registry and events together
//! - `conditional`: Pre/set/post rules and their store encoding
//! - `device`: Discovery adapters, device records and reconciliation
//! - `session`: XML snapshots of the device registry
//! - `store`: Settings store abstraction (Redis and in-memory)
//! - `error`: Error types with user-recoverable hints
#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod conditional;
pub mod config;
pub mod device;
pub mod env;
pub mod error;
pub mod events;
pub mod logging;
pub mod reference;
pub mod session;
pub mod store;
