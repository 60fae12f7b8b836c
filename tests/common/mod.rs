//! Common test utilities for enn.
//!
//! - `fixtures`: Temporary config and session files
//! - registry/rule builders shared by the integration modules
#![allow(dead_code)]

pub mod fixtures;

use std::collections::BTreeMap;
use std::sync::Arc;

use enn::app::App;
use enn::config::ConnectionConfig;
use enn::device::mock::MockAdapter;
use enn::device::{Descriptor, DeviceRecord};
use enn::store::MemoryStore;
use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection identity used by every in-memory test.
pub fn conn() -> ConnectionConfig {
    ConnectionConfig::new("127.0.0.1", 6379)
}

/// Descriptor from literal pairs.
pub fn descriptor(pairs: &[(&str, &str)]) -> Descriptor {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Record with the given uid, name and settings.
pub fn record(uid: &str, name: &str, settings: &[(&str, &str)]) -> DeviceRecord {
    let settings: BTreeMap<String, String> = settings
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    DeviceRecord::new(descriptor(&[("uid", uid), ("name", name)]), true)
        .expect("record has a uid")
        .with_settings(settings)
}

/// App over an in-memory store with one shared mock adapter.
pub fn mock_app(mock: &Arc<MockAdapter>) -> App {
    App::new(
        conn(),
        Box::new(MemoryStore::new()),
        vec![Box::new(Arc::clone(mock))],
    )
}
