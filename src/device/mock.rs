//! Mock discovery adapter for testing without hardware.
//!
//! Records every operation for later assertion and lets tests attach and
//! detach devices or inject errors.
//!
//! # Example
//!
//! ```rust,ignore
//! use enn::device::mock::{MockAdapter, Operation};
//! use enn::device::DiscoveryAdapter;
//!
//! let mock = MockAdapter::new();
//! mock.attach(MockAdapter::camera("cam-1", "Canon EOS 450D"));
//! mock.discover().unwrap();
//!
//! mock.assert_operations(&[Operation::Discover]);
//! ```

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{debug, trace};

use super::record::{Descriptor, DISCOVERY, NAME, UID};
use super::{store_capture, DiscoveryAdapter};
use crate::error::{EnnError, Result};
use crate::store::SettingsStore;

const ADAPTER_NAME: &str = "mock";

/// Recorded operation for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Discover,
    SetSetting {
        uid: String,
        name: String,
        value: String,
    },
    Slurp {
        uid: String,
    },
}

/// Mock adapter holding a list of "attached" devices.
#[derive(Default)]
pub struct MockAdapter {
    devices: Mutex<Vec<Descriptor>>,
    operation_log: Mutex<Vec<Operation>>,
    error_injection: Mutex<Option<EnnError>>,
    failing_settings: Mutex<Vec<String>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for a mock camera.
    pub fn camera(uid: &str, name: &str) -> Descriptor {
        let mut details = Descriptor::new();
        details.insert(UID.to_string(), uid.to_string());
        details.insert(NAME.to_string(), name.to_string());
        details.insert("port".to_string(), format!("mock:{uid}"));
        details.insert(DISCOVERY.to_string(), ADAPTER_NAME.to_string());
        details
    }

    // === Device Simulation ===

    /// Attach a device; replaces an attached device with the same uid.
    pub fn attach(&self, details: Descriptor) {
        let mut devices = self.devices.lock().unwrap();
        devices.retain(|d| d.get(UID) != details.get(UID));
        debug!(uid = ?details.get(UID), "Mock device attached");
        devices.push(details);
    }

    /// Detach a device by uid.
    pub fn detach(&self, uid: &str) {
        self.devices
            .lock()
            .unwrap()
            .retain(|d| d.get(UID).map(String::as_str) != Some(uid));
    }

    /// Inject an error for the next operation.
    pub fn inject_error(&self, error: EnnError) {
        *self.error_injection.lock().unwrap() = Some(error);
    }

    /// Make every attempt to apply `name` fail.
    pub fn fail_setting(&self, name: &str) {
        self.failing_settings.lock().unwrap().push(name.to_string());
    }

    // === Assertions ===

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.operation_log.lock().unwrap().clone()
    }

    /// Assert specific operations were performed.
    ///
    /// # Panics
    ///
    /// Panics if the operations don't match.
    pub fn assert_operations(&self, expected: &[Operation]) {
        let actual = self.operations();
        assert_eq!(
            actual, expected,
            "Operation mismatch.\nExpected: {expected:#?}\nActual: {actual:#?}",
        );
    }

    /// Assert a specific operation was performed at least once.
    ///
    /// # Panics
    ///
    /// Panics if the operation was not found.
    pub fn assert_contains(&self, expected: &Operation) {
        let ops = self.operations();
        assert!(
            ops.contains(expected),
            "Expected operation {expected:?} not found in: {ops:#?}",
        );
    }

    /// Clear the operation log for fresh assertions.
    pub fn clear_operations(&self) {
        self.operation_log.lock().unwrap().clear();
    }

    // === Internal Helpers ===

    fn record_op(&self, op: Operation) {
        trace!(?op, "Recording operation");
        self.operation_log.lock().unwrap().push(op);
    }

    fn check_error(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().unwrap().take() {
            return Err(error);
        }
        Ok(())
    }

    fn check_attached(&self, details: &Descriptor) -> Result<String> {
        let uid = details.get(UID).cloned().unwrap_or_default();
        let attached = self
            .devices
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.get(UID) == Some(&uid));
        if attached {
            Ok(uid)
        } else {
            Err(EnnError::Adapter(format!("mock device {uid} not attached")))
        }
    }
}

impl DiscoveryAdapter for MockAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn discover(&self) -> Result<Vec<Descriptor>> {
        self.record_op(Operation::Discover);
        self.check_error()?;
        Ok(self.devices.lock().unwrap().clone())
    }

    fn set_setting(&self, details: &Descriptor, name: &str, value: &str) -> Result<()> {
        let uid = details.get(UID).cloned().unwrap_or_default();
        self.record_op(Operation::SetSetting {
            uid,
            name: name.to_string(),
            value: value.to_string(),
        });
        self.check_error()?;
        self.check_attached(details)?;
        if self.failing_settings.lock().unwrap().iter().any(|s| s == name) {
            return Err(EnnError::Adapter(format!("mock setting {name} rejected")));
        }
        Ok(())
    }

    fn slurp(
        &self,
        store: &mut dyn SettingsStore,
        details: &Descriptor,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let uid = details.get(UID).cloned().unwrap_or_default();
        self.record_op(Operation::Slurp { uid: uid.clone() });
        self.check_error()?;
        self.check_attached(details)?;
        let key = store_capture(store, &uid, format!("mock-capture:{uid}").as_bytes(), metadata)?;
        Ok(vec![key])
    }
}
