//! In-memory device registry and reconciliation against discovery results.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::record::{check_field_name, descriptor_uid, is_valid_field_name, Descriptor, DeviceRecord};
use crate::error::{EnnError, Result};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Uids seen for the first time (new records).
    pub added: Vec<String>,
    /// Known uids that went from disconnected to connected.
    pub attached: Vec<String>,
    /// Uids that were connected before and are not anymore.
    pub detached: Vec<String>,
    /// Descriptors ignored because they carried no uid.
    pub skipped: usize,
}

impl ReconcileReport {
    /// True when no record changed connection state and none was added.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Ordered collection of device records, unique by uid.
///
/// Records are only ever removed through [`DeviceRegistry::remove`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceRegistry {
    records: Vec<DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from records, merging any with duplicate uids.
    pub fn from_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.insert(record);
        }
        registry
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&DeviceRecord> {
        self.records.iter().find(|r| r.uid() == uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut DeviceRecord> {
        self.records.iter_mut().find(|r| r.uid() == uid)
    }

    /// Records currently attached.
    pub fn connected(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.iter().filter(|r| r.connected)
    }

    /// Add a record, or merge it into the existing record with the same uid.
    pub fn insert(&mut self, record: DeviceRecord) {
        match self.get_mut(record.uid()) {
            Some(existing) => {
                existing.merge_details(&record.details);
                existing.settings.extend(record.settings);
                existing.connected = record.connected;
            }
            None => self.records.push(record),
        }
    }

    /// Manually remove a record.
    pub fn remove(&mut self, uid: &str) -> Option<DeviceRecord> {
        let index = self.records.iter().position(|r| r.uid() == uid)?;
        info!(uid, "Removed device record");
        Some(self.records.remove(index))
    }

    /// Record a setting value on a device.
    pub fn set_setting(&mut self, uid: &str, name: &str, value: &str) -> Result<()> {
        check_field_name(name)?;
        let record = self.get_mut(uid).ok_or_else(|| EnnError::DeviceNotFound {
            uid: uid.to_string(),
        })?;
        record.settings.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Reconcile the registry against a fresh discovery result.
    ///
    /// Every record is first marked disconnected. Each discovered uid is then
    /// merged into its record (details last-write-wins, `connected = true`)
    /// or added as a new connected record. Records that were not discovered
    /// keep their details and stay disconnected. Nothing is deleted.
    pub fn reconcile(&mut self, discovered: &[Descriptor]) -> ReconcileReport {
        let previously_connected: HashSet<String> =
            self.connected().map(|r| r.uid().to_string()).collect();

        for record in &mut self.records {
            record.connected = false;
        }

        let mut report = ReconcileReport::default();
        for details in discovered {
            let Some(uid) = descriptor_uid(details) else {
                warn!(?details, "Ignoring discovered device without uid");
                report.skipped += 1;
                continue;
            };
            let details = storable_details(details);

            if let Some(record) = self.get_mut(uid) {
                record.merge_details(&details);
                record.connected = true;
            } else if let Some(record) = DeviceRecord::new(details, true) {
                debug!(uid, "New device discovered");
                report.added.push(uid.to_string());
                self.records.push(record);
            }
        }

        for record in &self.records {
            let uid = record.uid();
            let was = previously_connected.contains(uid);
            if record.connected && !was && !report.added.iter().any(|a| a == uid) {
                report.attached.push(uid.to_string());
            } else if !record.connected && was {
                report.detached.push(uid.to_string());
            }
        }

        if !report.is_unchanged() {
            info!(
                added = report.added.len(),
                attached = report.attached.len(),
                detached = report.detached.len(),
                "Device registry reconciled"
            );
        }
        report
    }
}

/// Copy of `details` without fields that cannot be named in a session file.
fn storable_details(details: &Descriptor) -> Descriptor {
    details
        .iter()
        .filter(|(key, _)| {
            let keep = is_valid_field_name(key);
            if !keep {
                warn!(field = %key, "Dropping discovered detail with unusable name");
            }
            keep
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
