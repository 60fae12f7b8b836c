//! The owning application context.
//!
//! [`App`] holds the store connection, discovery adapters, device registry
//! and event queue. Background sources only send events; every registry
//! mutation happens on the thread that owns the `App`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::conditional::{self, Conditional};
use crate::config::ConnectionConfig;
use crate::device::{BoxedAdapter, DeviceRegistry, ReconcileReport, UsbPoller, DISCOVERY};
use crate::env;
use crate::error::{EnnError, Result};
use crate::events::{Event, EventQueue, EventSender};
use crate::reference;
use crate::session;
use crate::store::{KeyspaceListener, SettingsStore};

/// What one [`App::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Events drained this tick, duplicates coalesced.
    pub events: Vec<Event>,
    /// Present when a USB change triggered rediscovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
    pub env_reloaded: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.events.is_empty()
    }
}

/// Adapter that discovered a device, falling back to the first adapter.
fn find_adapter<'a>(
    adapters: &'a [BoxedAdapter],
    discovery: Option<&str>,
) -> Option<&'a BoxedAdapter> {
    discovery
        .and_then(|name| adapters.iter().find(|a| a.name() == name))
        .or_else(|| adapters.first())
}

pub struct App {
    conn: ConnectionConfig,
    store: Box<dyn SettingsStore>,
    adapters: Vec<BoxedAdapter>,
    registry: DeviceRegistry,
    events: EventQueue,
    usb: Option<UsbPoller>,
    keyspace: Option<KeyspaceListener>,
    env: BTreeMap<String, String>,
    session_path: Option<PathBuf>,
}

/// Where an unreadable session file is kept: the same name plus `.bad`.
pub fn bad_session_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bad");
    PathBuf::from(name)
}

impl App {
    pub fn new(
        conn: ConnectionConfig,
        store: Box<dyn SettingsStore>,
        adapters: Vec<BoxedAdapter>,
    ) -> Self {
        Self {
            conn,
            store,
            adapters,
            registry: DeviceRegistry::new(),
            events: EventQueue::new(),
            usb: None,
            keyspace: None,
            env: BTreeMap::new(),
            session_path: None,
        }
    }

    /// Seed the registry from a session file and save back to it later.
    ///
    /// A missing file leaves the registry empty. An unreadable file is
    /// renamed to `<file>.bad` so later saves cannot overwrite it; if it
    /// cannot be moved, the session is not saved at all.
    pub fn with_session(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match session::load(&path) {
            Ok(registry) => self.registry = registry,
            Err(e) => {
                let aside = bad_session_path(&path);
                if let Err(rename_err) = fs::rename(&path, &aside) {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        rename_error = %rename_err,
                        "Unreadable session left in place, saving disabled"
                    );
                    return self;
                }
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Unreadable session moved aside, starting empty"
                );
            }
        }
        self.session_path = Some(path);
        self
    }

    pub const fn connection(&self) -> &ConnectionConfig {
        &self.conn
    }

    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn store_mut(&mut self) -> &mut dyn SettingsStore {
        self.store.as_mut()
    }

    pub fn session_path(&self) -> Option<&Path> {
        self.session_path.as_deref()
    }

    // ---- devices ----

    /// Query every adapter and reconcile the registry with the results.
    ///
    /// A failing adapter is logged and contributes no devices.
    #[instrument(skip(self))]
    pub fn update_devices(&mut self) -> ReconcileReport {
        let mut discovered = Vec::new();
        for adapter in &self.adapters {
            match adapter.discover() {
                Ok(descriptors) => {
                    debug!(adapter = adapter.name(), count = descriptors.len(), "Discovered");
                    discovered.extend(descriptors.into_iter().map(|mut details| {
                        details
                            .entry(DISCOVERY.to_string())
                            .or_insert_with(|| adapter.name().to_string());
                        details
                    }));
                }
                Err(e) => warn!(adapter = adapter.name(), error = %e, "Discovery failed"),
            }
        }

        self.registry.reconcile(&discovered)
    }

    /// Adjustable settings for a device, from the script reference.
    pub fn adjustable_settings(&mut self, uid: &str) -> Result<Option<BTreeMap<String, String>>> {
        let record = self.registry.get(uid).ok_or_else(|| EnnError::DeviceNotFound {
            uid: uid.to_string(),
        })?;
        let Some(name) = record.name().map(str::to_string) else {
            return Ok(None);
        };
        reference::settings_for(self.store.as_mut(), &name)
    }

    /// Record a setting and push it to the device.
    ///
    /// Returns whether the adapter accepted it. Adapter failures are logged
    /// and the setting stays recorded.
    #[instrument(skip(self))]
    pub fn apply_setting(&mut self, uid: &str, name: &str, value: &str) -> Result<bool> {
        self.registry.set_setting(uid, name, value)?;
        let Some(record) = self.registry.get(uid) else {
            return Err(EnnError::DeviceNotFound {
                uid: uid.to_string(),
            });
        };

        let Some(adapter) = find_adapter(&self.adapters, record.discovery()) else {
            warn!(uid, "No adapter available, setting only recorded");
            return Ok(false);
        };
        match adapter.set_setting(&record.details, name, value) {
            Ok(()) => {
                info!(uid, name, value, "Setting applied");
                Ok(true)
            }
            Err(e) => {
                warn!(uid, name, value, error = %e, "Setting not applied");
                Ok(false)
            }
        }
    }

    /// Apply every `set` entry of a stored rule to a device.
    ///
    /// Returns the number of settings the adapter accepted.
    pub fn apply_conditional(&mut self, uid: &str, name: &str) -> Result<usize> {
        if self.registry.get(uid).is_none() {
            return Err(EnnError::DeviceNotFound {
                uid: uid.to_string(),
            });
        }
        let rule = conditional::read(self.store.as_mut(), &self.conn, name, uid)?.ok_or_else(
            || EnnError::ConditionalNotFound {
                name: name.to_string(),
                device: uid.to_string(),
            },
        )?;

        let mut applied = 0;
        for (setting, value) in &rule.set_contents {
            match self.apply_setting(uid, setting, value) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(EnnError::InvalidFieldName { name: field }) => {
                    warn!(uid, rule = name, setting = %field, "Skipping setting with unusable name");
                }
                Err(e) => return Err(e),
            }
        }
        info!(uid, rule = name, applied, total = rule.set_contents.len(), "Conditional applied");
        Ok(applied)
    }

    /// Capture from a device into the store. Returns the created record keys.
    #[instrument(skip(self, metadata))]
    pub fn slurp(&mut self, uid: &str, metadata: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let record = self.registry.get(uid).ok_or_else(|| EnnError::DeviceNotFound {
            uid: uid.to_string(),
        })?;
        let adapter = find_adapter(&self.adapters, record.discovery())
            .ok_or_else(|| EnnError::Adapter("no discovery adapter configured".to_string()))?;

        adapter
            .slurp(self.store.as_mut(), &record.details, metadata)
            .inspect_err(|e| warn!(uid, error = %e, "Slurp failed"))
    }

    // ---- conditionals ----

    pub fn write_conditional(&mut self, rule: &Conditional) -> Result<()> {
        conditional::write(self.store.as_mut(), &self.conn, rule)
    }

    pub fn conditionals(&mut self, device: &str) -> Result<Vec<Conditional>> {
        conditional::read_all(self.store.as_mut(), &self.conn, device)
    }

    pub fn conditional(&mut self, name: &str, device: &str) -> Result<Option<Conditional>> {
        conditional::read(self.store.as_mut(), &self.conn, name, device)
    }

    pub fn remove_conditional(&mut self, name: &str, device: &str) -> Result<bool> {
        conditional::remove(self.store.as_mut(), &self.conn, name, device)
    }

    // ---- environment ----

    /// Environment values as of the last reload.
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn reload_env(&mut self) -> Result<()> {
        self.env = env::values(self.store.as_mut(), &self.conn)?;
        debug!(fields = self.env.len(), "Environment reloaded");
        Ok(())
    }

    pub fn set_env(&mut self, field: &str, value: &str) -> Result<()> {
        env::set(self.store.as_mut(), &self.conn, field, value)?;
        self.reload_env()
    }

    pub fn remove_env(&mut self, field: &str) -> Result<()> {
        env::remove(self.store.as_mut(), &self.conn, field)?;
        self.reload_env()
    }

    // ---- events ----

    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    /// Start polling the USB device directory.
    pub fn start_usb_poller(&mut self, root: PathBuf, interval: Duration) -> Result<()> {
        if self.usb.is_none() {
            self.usb = Some(UsbPoller::spawn(root, interval, self.events.sender())?);
        }
        Ok(())
    }

    /// Subscribe to keyspace notifications from the store.
    pub fn start_keyspace_listener(&mut self) -> Result<()> {
        if self.keyspace.is_none() {
            self.keyspace = Some(KeyspaceListener::spawn(&self.conn, self.events.sender())?);
        }
        Ok(())
    }

    /// Drain pending events and react to them.
    ///
    /// Any number of USB edges in one tick cause a single rediscovery; a
    /// change to the environment key reloads the environment.
    pub fn tick(&mut self) -> TickReport {
        let events = self.events.tick();
        let mut report = TickReport::default();
        if events.is_empty() {
            return report;
        }

        if events.iter().any(Event::is_usb) {
            report.reconcile = Some(self.update_devices());
        }

        let env_key = self.conn.env_key();
        let env_changed = events
            .iter()
            .any(|e| matches!(e, Event::KeyChanged(key) if *key == env_key));
        if env_changed {
            match self.reload_env() {
                Ok(()) => report.env_reloaded = true,
                Err(e) => warn!(error = %e, "Environment reload failed"),
            }
        }

        report.events = events;
        report
    }

    // ---- lifecycle ----

    /// Save the registry to the session file, if one is configured.
    pub fn save_session(&self) -> Result<()> {
        match &self.session_path {
            Some(path) => session::save(&self.registry, path),
            None => Ok(()),
        }
    }

    /// Stop background activity and save the session.
    pub fn shutdown(&mut self) {
        if let Some(mut usb) = self.usb.take() {
            usb.stop();
        }
        if let Some(mut keyspace) = self.keyspace.take() {
            keyspace.stop();
        }
        if let Err(e) = self.save_session() {
            warn!(error = %e, "Failed to save session on shutdown");
        }
        info!("Shut down");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(mut usb) = self.usb.take() {
            usb.stop();
        }
        if let Some(mut keyspace) = self.keyspace.take() {
            keyspace.stop();
        }
    }
}
