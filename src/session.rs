//! Session snapshots of the device registry.
//!
//! A session file records every known device with its details and the
//! settings applied to it:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <machine>
//!   <session>
//!     <device discovery="gphoto2" name="Canon EOS 450D (Rebel XSi)" uid="1234">
//!       <settings iso="400"/>
//!     </device>
//!   </session>
//! </machine>
//! ```
//!
//! Attributes are written in sorted order, so saving unchanged data twice
//! produces identical files. Connection state is not persisted; loaded
//! records start disconnected until discovery sees them again.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info, instrument, warn};

use crate::device::{is_valid_field_name, DeviceRecord, DeviceRegistry};
use crate::error::{EnnError, Result};

const MACHINE: &str = "machine";
const SESSION: &str = "session";
const DEVICE: &str = "device";
const SETTINGS: &str = "settings";

fn format_err(e: impl std::fmt::Display) -> EnnError {
    EnnError::SessionFormat(e.to_string())
}

fn element<'a>(
    name: &'a str,
    uid: &str,
    attrs: &'a BTreeMap<String, String>,
) -> Result<BytesStart<'a>> {
    let mut start = BytesStart::new(name);
    for (key, value) in attrs {
        if !is_valid_field_name(key) {
            return Err(EnnError::SessionFormat(format!(
                "device {uid}: '{key}' is not a valid {name} attribute name"
            )));
        }
        start.push_attribute((key.as_str(), value.as_str()));
    }
    Ok(start)
}

/// Serialize the registry to a session document.
///
/// Fails with `SessionFormat` when a detail or setting name could not be
/// read back as an attribute.
pub fn to_xml(registry: &DeviceRegistry) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(format_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(MACHINE)))
        .map_err(format_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(SESSION)))
        .map_err(format_err)?;

    for record in registry.records() {
        writer
            .write_event(Event::Start(element(DEVICE, record.uid(), &record.details)?))
            .map_err(format_err)?;
        writer
            .write_event(Event::Empty(element(SETTINGS, record.uid(), &record.settings)?))
            .map_err(format_err)?;
        writer
            .write_event(Event::End(BytesEnd::new(DEVICE)))
            .map_err(format_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(SESSION)))
        .map_err(format_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(MACHINE)))
        .map_err(format_err)?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(format_err)?;
    xml.push('\n');
    Ok(xml)
}

fn attributes(start: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut attrs = BTreeMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(format_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(format_err)?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn finish_device(
    details: BTreeMap<String, String>,
    settings: BTreeMap<String, String>,
    records: &mut Vec<DeviceRecord>,
) {
    match DeviceRecord::new(details, false) {
        Some(record) => records.push(record.with_settings(settings)),
        None => warn!("Skipping session device without uid"),
    }
}

/// Parse a session document into disconnected records.
pub fn from_xml(xml: &str) -> Result<Vec<DeviceRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut saw_machine = false;
    let mut depth = 0usize;
    let mut current: Option<(BTreeMap<String, String>, BTreeMap<String, String>)> = None;

    loop {
        let event = reader.read_event().map_err(format_err)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        match event {
            Event::Start(e) if e.name().as_ref() == MACHINE.as_bytes() => saw_machine = true,
            Event::Start(e) if e.name().as_ref() == DEVICE.as_bytes() => {
                current = Some((attributes(&e)?, BTreeMap::new()));
            }
            Event::Empty(e) if e.name().as_ref() == DEVICE.as_bytes() => {
                finish_device(attributes(&e)?, BTreeMap::new(), &mut records);
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == SETTINGS.as_bytes() => {
                if let Some((_, settings)) = current.as_mut() {
                    settings.extend(attributes(&e)?);
                }
            }
            Event::End(e) if e.name().as_ref() == DEVICE.as_bytes() => {
                if let Some((details, settings)) = current.take() {
                    finish_device(details, settings, &mut records);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(EnnError::SessionFormat(
            "document ends inside an open element".to_string(),
        ));
    }
    if !saw_machine {
        return Err(EnnError::SessionFormat(format!(
            "missing <{MACHINE}> root element"
        )));
    }
    Ok(records)
}

/// Write the registry to `path`, creating parent directories.
///
/// The document is written to a sibling temporary file and renamed into
/// place.
#[instrument(skip(registry), fields(path = %path.display()))]
pub fn save(registry: &DeviceRegistry, path: &Path) -> Result<()> {
    let xml = to_xml(registry)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("xml.tmp");
    fs::write(&tmp, xml)?;
    fs::rename(&tmp, path)?;
    info!(devices = registry.len(), "Session saved");
    Ok(())
}

/// Load a registry from `path`. A missing file yields an empty registry.
#[instrument(fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<DeviceRegistry> {
    let xml = match fs::read_to_string(path) {
        Ok(xml) => xml,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No session file, starting empty");
            return Ok(DeviceRegistry::new());
        }
        Err(e) => return Err(e.into()),
    };
    let registry = DeviceRegistry::from_records(from_xml(&xml)?);
    info!(devices = registry.len(), "Session loaded");
    Ok(registry)
}
