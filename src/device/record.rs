//! Device records held by the registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EnnError, Result};

/// Key-value description of a device as reported by a discovery adapter.
pub type Descriptor = BTreeMap<String, String>;

/// Detail field carrying the reconciliation key.
pub const UID: &str = "uid";
/// Detail field carrying the human-readable model name.
pub const NAME: &str = "name";
/// Detail field naming the adapter that discovered the device.
pub const DISCOVERY: &str = "discovery";

/// A known device: what was last discovered about it, the settings applied
/// to it, and whether it is currently attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub connected: bool,
    pub details: Descriptor,
    pub settings: BTreeMap<String, String>,
}

impl DeviceRecord {
    /// Create a record from discovered details.
    ///
    /// Returns `None` when `details` has no non-empty `uid`.
    pub fn new(details: Descriptor, connected: bool) -> Option<Self> {
        descriptor_uid(&details)?;
        Some(Self {
            connected,
            details,
            settings: BTreeMap::new(),
        })
    }

    /// Attach settings to a freshly built record.
    #[must_use]
    pub fn with_settings(mut self, settings: BTreeMap<String, String>) -> Self {
        self.settings = settings;
        self
    }

    pub fn uid(&self) -> &str {
        self.details.get(UID).map_or("", String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.details.get(NAME).map(String::as_str)
    }

    pub fn discovery(&self) -> Option<&str> {
        self.details.get(DISCOVERY).map(String::as_str)
    }

    /// Overwrite details field by field with `details`.
    ///
    /// Fields absent from `details` keep their previous values.
    pub fn merge_details(&mut self, details: &Descriptor) {
        for (key, value) in details {
            self.details.insert(key.clone(), value.clone());
        }
    }
}

/// Whether `name` can be stored as a detail or setting field.
///
/// Fields become XML attribute names in the session file, so they follow
/// the XML `Name` production: a letter, `_` or `:` first, then letters,
/// digits, `_`, `:`, `-`, `.` or U+00B7.
pub fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    is_name_start(first) && chars.all(|c| is_name_start(c) || is_name_char(c))
}

fn is_name_start(c: char) -> bool {
    matches!(c,
        'A'..='Z' | 'a'..='z' | '_' | ':'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    matches!(c,
        '0'..='9' | '-' | '.' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Check a field name, naming the offending field on failure.
pub fn check_field_name(name: &str) -> Result<()> {
    if is_valid_field_name(name) {
        Ok(())
    } else {
        Err(EnnError::InvalidFieldName {
            name: name.to_string(),
        })
    }
}

/// The uid of a descriptor, if it has a usable one.
pub fn descriptor_uid(details: &Descriptor) -> Option<&str> {
    details
        .get(UID)
        .map(String::as_str)
        .filter(|uid| !uid.is_empty())
}
