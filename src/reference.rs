//! Script reference documents.
//!
//! A reference document names, per device model, the script whose calls
//! expose that device's adjustable settings:
//!
//! ```xml
//! <reference>
//!   <script name="gphoto2">
//!     <call name="iso" template="gphoto2 --set-config iso={}"/>
//!   </script>
//!   <device name="Canon EOS 450D (Rebel XSi)" script="gphoto2"/>
//! </reference>
//! ```
//!
//! Loading writes `scripts:<script>` hashes (call name → template) and the
//! `device:script_lookup` hash (device name → script).

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::{EnnError, Result};
use crate::store::SettingsStore;

/// Hash mapping device names to script names.
pub const DEVICE_SCRIPT_LOOKUP_KEY: &str = "device:script_lookup";

/// Reference document compiled into the binary.
pub const DEFAULT_REFERENCE: &str = include_str!("reference.xml");

/// Hash holding the calls of one script.
pub fn script_key(script: &str) -> String {
    format!("scripts:{script}")
}

/// Parsed contents of a reference document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Script name → (call name → template).
    pub scripts: BTreeMap<String, BTreeMap<String, String>>,
    /// Device name → script name.
    pub devices: BTreeMap<String, String>,
}

/// Counts of what a load wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub scripts: usize,
    pub calls: usize,
    pub devices: usize,
}

fn xml_err(e: impl std::fmt::Display) -> EnnError {
    EnnError::ReferenceFormat(e.to_string())
}

fn attributes(element: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut attrs = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

impl Reference {
    /// Parse a reference document.
    ///
    /// Calls belong to the script element that contains them; elements
    /// missing a required attribute are skipped with a warning.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut reference = Self::default();
        let mut current_script: Option<String> = None;

        loop {
            let event = reader.read_event().map_err(xml_err)?;
            let (element, is_empty) = match &event {
                Event::Start(e) => (e, false),
                Event::Empty(e) => (e, true),
                Event::End(e) => {
                    if e.name().as_ref() == b"script" {
                        current_script = None;
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            match element.name().as_ref() {
                b"script" => {
                    let attrs = attributes(element)?;
                    let Some(name) = attrs.get("name") else {
                        warn!("Skipping script without a name");
                        continue;
                    };
                    reference.scripts.entry(name.clone()).or_default();
                    if !is_empty {
                        current_script = Some(name.clone());
                    }
                }
                b"call" => {
                    let attrs = attributes(element)?;
                    let (Some(script), Some(name), Some(template)) =
                        (&current_script, attrs.get("name"), attrs.get("template"))
                    else {
                        warn!(?attrs, "Skipping call outside a script or missing attributes");
                        continue;
                    };
                    reference
                        .scripts
                        .entry(script.clone())
                        .or_default()
                        .insert(name.clone(), template.clone());
                }
                b"device" => {
                    let attrs = attributes(element)?;
                    let (Some(name), Some(script)) = (attrs.get("name"), attrs.get("script"))
                    else {
                        warn!(?attrs, "Skipping device without name or script");
                        continue;
                    };
                    reference.devices.insert(name.clone(), script.clone());
                }
                _ => {}
            }
        }

        Ok(reference)
    }

    /// Write the reference into the store.
    #[instrument(skip_all)]
    pub fn store(&self, store: &mut dyn SettingsStore) -> Result<LoadSummary> {
        let mut summary = LoadSummary::default();
        for (script, calls) in &self.scripts {
            store.hash_set_all(&script_key(script), calls)?;
            summary.scripts += 1;
            summary.calls += calls.len();
        }
        for (device, script) in &self.devices {
            store.hash_set(DEVICE_SCRIPT_LOOKUP_KEY, device, script)?;
            summary.devices += 1;
        }
        info!(
            scripts = summary.scripts,
            calls = summary.calls,
            devices = summary.devices,
            "Reference loaded"
        );
        Ok(summary)
    }
}

/// Load reference files into the store, or the bundled reference when
/// `files` is empty.
pub fn load_files<P: AsRef<Path>>(
    store: &mut dyn SettingsStore,
    files: &[P],
) -> Result<LoadSummary> {
    if files.is_empty() {
        debug!("Loading bundled reference");
        return Reference::parse(DEFAULT_REFERENCE)?.store(store);
    }

    let mut total = LoadSummary::default();
    for file in files {
        let path = file.as_ref();
        let xml = std::fs::read_to_string(path)
            .map_err(|e| EnnError::ReferenceFormat(format!("{}: {e}", path.display())))?;
        let summary = Reference::parse(&xml)?.store(store)?;
        total.scripts += summary.scripts;
        total.calls += summary.calls;
        total.devices += summary.devices;
    }
    Ok(total)
}

/// Adjustable settings (call name → template) for a device model.
///
/// Returns `None` when the device has no script or the script has no calls.
pub fn settings_for(
    store: &mut dyn SettingsStore,
    device_name: &str,
) -> Result<Option<BTreeMap<String, String>>> {
    let Some(script) = store.hash_get(DEVICE_SCRIPT_LOOKUP_KEY, device_name)? else {
        debug!(device = device_name, "No script lookup for device");
        return Ok(None);
    };
    let calls = store.hash_get_all(&script_key(&script))?;
    if calls.is_empty() {
        debug!(device = device_name, script = %script, "Script has no calls");
        return Ok(None);
    }
    Ok(Some(calls))
}
