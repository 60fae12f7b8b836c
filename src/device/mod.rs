//! Device discovery, records and the registry.
//!
//! This module provides a trait-based abstraction over the external
//! capture tooling ([`DiscoveryAdapter`]) with a gphoto2-backed
//! implementation and a mock for tests, plus the in-memory
//! [`DeviceRegistry`] that discovery results are reconciled into.

mod gphoto2;
pub mod mock;
mod record;
mod registry;
mod usb;

pub use gphoto2::{parse_auto_detect, parse_config_value, Gphoto2Adapter};
pub use record::{
    check_field_name, descriptor_uid, is_valid_field_name, Descriptor, DeviceRecord, DISCOVERY,
    NAME, UID,
};
pub use registry::{DeviceRegistry, ReconcileReport};
pub use usb::{diff_usb, scan_usb, UsbPoller};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::store::SettingsStore;

/// Operations the crate needs from a device-capture backend.
///
/// Implementations are opaque collaborators: they enumerate hardware,
/// push a setting to a device, and capture ("slurp") data into the store.
pub trait DiscoveryAdapter {
    /// Short adapter name, stored in each descriptor's `discovery` field.
    fn name(&self) -> &str;

    /// Enumerate currently attached devices.
    ///
    /// Every descriptor should carry a unique `uid`.
    fn discover(&self) -> Result<Vec<Descriptor>>;

    /// Apply one setting to the device described by `details`.
    fn set_setting(&self, details: &Descriptor, name: &str, value: &str) -> Result<()>;

    /// Capture from the device and store the result.
    ///
    /// Returns the keys of the records created.
    fn slurp(
        &self,
        store: &mut dyn SettingsStore,
        details: &Descriptor,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;
}

/// Type alias for boxed trait object.
pub type BoxedAdapter = Box<dyn DiscoveryAdapter>;

impl<T: DiscoveryAdapter + ?Sized> DiscoveryAdapter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn discover(&self) -> Result<Vec<Descriptor>> {
        (**self).discover()
    }

    fn set_setting(&self, details: &Descriptor, name: &str, value: &str) -> Result<()> {
        (**self).set_setting(details, name, value)
    }

    fn slurp(
        &self,
        store: &mut dyn SettingsStore,
        details: &Descriptor,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        (**self).slurp(store, details, metadata)
    }
}

/// Store captured bytes and a record describing them.
///
/// The bytes go under `glworb_binary:<uuid>`; the record is a hash at
/// `glworb:<uuid>` carrying `uuid`, `binary_key`, `created`, `source_uid`
/// and every metadata field. Returns the record key.
pub fn store_capture(
    store: &mut dyn SettingsStore,
    source_uid: &str,
    bytes: &[u8],
    metadata: &BTreeMap<String, String>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let binary_key = format!("glworb_binary:{id}");
    let record_key = format!("glworb:{id}");

    store.set_bytes(&binary_key, bytes)?;

    let mut fields = metadata.clone();
    fields.insert("uuid".to_string(), id);
    fields.insert("binary_key".to_string(), binary_key);
    fields.insert("created".to_string(), Utc::now().to_rfc3339());
    fields.insert("source_uid".to_string(), source_uid.to_string());
    store.hash_set_all(&record_key, &fields)?;

    info!(record = %record_key, size = bytes.len(), "Stored capture");
    Ok(record_key)
}
