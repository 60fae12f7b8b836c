//! Conditional rules: named pre/set/post bundles attached to a device.
//!
//! A rule is stored as up to three store keys, one per [`Step`]:
//!
//! ```text
//! settings:pre:<name>:<device>:<host>:<port>    list of scripts
//! settings:set:<name>:<device>:<host>:<port>    hash of setting -> value
//! settings:post:<name>:<device>:<host>:<port>   list of scripts
//! ```
//!
//! Empty steps have no key; a rule with no keys does not exist.

mod keys;

pub use keys::{device_pattern, parse_key, step_key};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::ConnectionConfig;
use crate::device::is_valid_field_name;
use crate::error::{EnnError, Result};
use crate::store::SettingsStore;

/// One layer of a conditional rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Scripts run before settings are applied.
    Pre,
    /// Settings to apply.
    Set,
    /// Scripts run after settings are applied.
    Post,
}

impl Step {
    pub const ALL: [Self; 3] = [Self::Pre, Self::Set, Self::Post];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Set => "set",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = EnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre" => Ok(Self::Pre),
            "set" => Ok(Self::Set),
            "post" => Ok(Self::Post),
            other => Err(EnnError::Other(format!("unknown conditional step '{other}'"))),
        }
    }
}

/// A named conditional rule for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditional {
    pub name: String,
    /// Device uid.
    pub device: String,
    pub pre_contents: Vec<String>,
    pub set_contents: BTreeMap<String, String>,
    pub post_contents: Vec<String>,
}

impl Conditional {
    pub fn new(name: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            ..Self::default()
        }
    }

    /// True when no step has any content.
    pub fn is_empty(&self) -> bool {
        Step::ALL.iter().all(|&step| self.step_is_empty(step))
    }

    pub fn step_is_empty(&self, step: Step) -> bool {
        match step {
            Step::Pre => self.pre_contents.is_empty(),
            Step::Set => self.set_contents.is_empty(),
            Step::Post => self.post_contents.is_empty(),
        }
    }

    /// Render one step as editable text.
    pub fn step_text(&self, step: Step) -> String {
        match step {
            Step::Pre => self.pre_contents.join("\n"),
            Step::Set => self
                .set_contents
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Step::Post => self.post_contents.join("\n"),
        }
    }

    /// Replace one step from text.
    ///
    /// On a parse error the rule is left unchanged.
    pub fn set_step_text(&mut self, step: Step, text: &str) -> Result<()> {
        match step {
            Step::Pre => self.pre_contents = parse_scripts(text),
            Step::Set => self.set_contents = parse_settings(text)?,
            Step::Post => self.post_contents = parse_scripts(text),
        }
        Ok(())
    }
}

/// One script per non-empty line.
pub fn parse_scripts(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// One `field=value` per non-empty line; `#` starts a comment line.
pub fn parse_settings(text: &str) -> Result<BTreeMap<String, String>> {
    let mut settings = BTreeMap::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parse_error = |reason: &str| EnnError::ConditionalParse {
            step: Step::Set.to_string(),
            line: index + 1,
            reason: reason.to_string(),
        };
        let (field, value) = line
            .split_once('=')
            .ok_or_else(|| parse_error("expected field=value"))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(parse_error("empty field name"));
        }
        if !is_valid_field_name(field) {
            return Err(parse_error("field is not a valid setting name"));
        }
        settings.insert(field.to_string(), value.trim().to_string());
    }
    Ok(settings)
}

/// Reject rule names that would make step keys ambiguous.
///
/// The name sits between the step and the device uid in the key, and
/// device uids may contain `:`, so names may not.
pub fn check_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(':') {
        "name contains ':'"
    } else {
        return Ok(());
    };
    Err(EnnError::InvalidConditionalName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Store a rule, replacing whatever was stored under its identity.
///
/// All three step keys are deleted first; only non-empty steps are written.
#[instrument(skip_all, fields(name = %rule.name, device = %rule.device))]
pub fn write(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
    rule: &Conditional,
) -> Result<()> {
    check_name(&rule.name)?;
    let keys: Vec<String> = Step::ALL
        .iter()
        .map(|&step| step_key(step, &rule.name, &rule.device, conn))
        .collect();
    store.delete(&keys)?;

    for (step, key) in Step::ALL.iter().zip(&keys) {
        match step {
            Step::Pre => store.list_push(key, &rule.pre_contents)?,
            Step::Set => store.hash_set_all(key, &rule.set_contents)?,
            Step::Post => store.list_push(key, &rule.post_contents)?,
        }
    }
    info!("Conditional written");
    Ok(())
}

/// All rules stored for `device`, sorted by name.
#[instrument(skip(store, conn))]
pub fn read_all(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
    device: &str,
) -> Result<Vec<Conditional>> {
    let mut rules: BTreeMap<String, Conditional> = BTreeMap::new();

    for key in store.scan(&device_pattern(device, conn))? {
        let Some((step, name)) = parse_key(&key, device, conn) else {
            debug!(key = %key, "Skipping key that is not a conditional step");
            continue;
        };
        let rule = rules
            .entry(name.clone())
            .or_insert_with(|| Conditional::new(name, device));
        match step {
            Step::Pre => rule.pre_contents = store.list_range(&key)?,
            Step::Set => rule.set_contents = store.hash_get_all(&key)?,
            Step::Post => rule.post_contents = store.list_range(&key)?,
        }
    }

    Ok(rules.into_values().filter(|rule| !rule.is_empty()).collect())
}

/// One rule, or `None` when none of its keys exist.
pub fn read(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
    name: &str,
    device: &str,
) -> Result<Option<Conditional>> {
    check_name(name)?;
    let mut rule = Conditional::new(name, device);
    for step in Step::ALL {
        let key = step_key(step, name, device, conn);
        match step {
            Step::Pre => rule.pre_contents = store.list_range(&key)?,
            Step::Set => rule.set_contents = store.hash_get_all(&key)?,
            Step::Post => rule.post_contents = store.list_range(&key)?,
        }
    }
    Ok((!rule.is_empty()).then_some(rule))
}

/// Delete a rule. Returns whether anything was stored.
pub fn remove(
    store: &mut dyn SettingsStore,
    conn: &ConnectionConfig,
    name: &str,
    device: &str,
) -> Result<bool> {
    check_name(name)?;
    let keys: Vec<String> = Step::ALL
        .iter()
        .map(|&step| step_key(step, name, device, conn))
        .collect();
    let mut existed = false;
    for key in &keys {
        existed |= store.exists(key)?;
    }
    store.delete(&keys)?;
    if existed {
        info!(name, device, "Conditional removed");
    }
    Ok(existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StoreOp;
    use crate::store::MemoryStore;

    fn conn() -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", 6379)
    }

    fn sample() -> Conditional {
        let mut rule = Conditional::new("night", "cam-1");
        rule.pre_contents = vec!["lamp on".to_string(), "wait 2".to_string()];
        rule.set_contents.insert("iso".to_string(), "1600".to_string());
        rule.set_contents.insert("shutterspeed".to_string(), "1/30".to_string());
        rule.post_contents = vec!["lamp off".to_string()];
        rule
    }

    #[test]
    fn test_step_roundtrip_names() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert!("during".parse::<Step>().is_err());
    }

    #[test]
    fn test_write_then_read_recovers_contents() {
        let mut store = MemoryStore::new();
        let rule = sample();
        write(&mut store, &conn(), &rule).unwrap();

        let found = read(&mut store, &conn(), "night", "cam-1").unwrap().unwrap();
        assert_eq!(found, rule);
        assert_eq!(read_all(&mut store, &conn(), "cam-1").unwrap(), vec![rule]);
    }

    #[test]
    fn test_empty_pre_leaves_no_pre_key() {
        let mut store = MemoryStore::new();
        let mut rule = Conditional::new("day", "cam-1");
        rule.set_contents.insert("iso".to_string(), "100".to_string());
        write(&mut store, &conn(), &rule).unwrap();

        assert!(!store
            .exists(&step_key(Step::Pre, "day", "cam-1", &conn()))
            .unwrap());
        assert!(store
            .exists(&step_key(Step::Set, "day", "cam-1", &conn()))
            .unwrap());
        assert!(!store
            .exists(&step_key(Step::Post, "day", "cam-1", &conn()))
            .unwrap());
    }

    #[test]
    fn test_write_deletes_before_writing() {
        let mut store = MemoryStore::new();
        write(&mut store, &conn(), &sample()).unwrap();
        store.clear_operations();

        let mut shrunk = Conditional::new("night", "cam-1");
        shrunk.post_contents = vec!["beep".to_string()];
        write(&mut store, &conn(), &shrunk).unwrap();

        let ops = store.operations();
        let first_write = ops
            .iter()
            .position(|op| !matches!(op, StoreOp::Delete { .. }))
            .unwrap();
        assert_eq!(first_write, 3);
        assert_eq!(
            read(&mut store, &conn(), "night", "cam-1").unwrap(),
            Some(shrunk)
        );
    }

    #[test]
    fn test_read_all_groups_by_name_and_ignores_other_devices() {
        let mut store = MemoryStore::new();
        write(&mut store, &conn(), &sample()).unwrap();
        let mut other = Conditional::new("day", "cam-1");
        other.pre_contents = vec!["open shutter".to_string()];
        write(&mut store, &conn(), &other).unwrap();
        let mut elsewhere = sample();
        elsewhere.device = "cam-2".to_string();
        write(&mut store, &conn(), &elsewhere).unwrap();
        let mut other_store = sample();
        other_store.name = "remote".to_string();
        write(&mut store, &ConnectionConfig::new("10.0.0.9", 6379), &other_store).unwrap();

        let rules = read_all(&mut store, &conn(), "cam-1").unwrap();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["day", "night"]);
    }

    #[test]
    fn test_missing_rule_reads_none() {
        let mut store = MemoryStore::new();
        assert_eq!(read(&mut store, &conn(), "ghost", "cam-1").unwrap(), None);
        assert!(!remove(&mut store, &conn(), "ghost", "cam-1").unwrap());
    }

    #[test]
    fn test_remove_deletes_all_steps() {
        let mut store = MemoryStore::new();
        write(&mut store, &conn(), &sample()).unwrap();
        assert!(remove(&mut store, &conn(), "night", "cam-1").unwrap());
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_parse_settings() {
        let parsed = parse_settings("iso=400\n\n# comment\n shutterspeed = 1/60 \n").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["shutterspeed"], "1/60");
    }

    #[test]
    fn test_malformed_text_keeps_prior_value() {
        let mut rule = sample();
        let err = rule.set_step_text(Step::Set, "iso=100\nnonsense").unwrap_err();
        match err {
            EnnError::ConditionalParse { step, line, .. } => {
                assert_eq!(step, "set");
                assert_eq!(line, 2);
            }
            other => panic!("Expected ConditionalParse, got {other:?}"),
        }
        assert_eq!(rule, sample());

        assert!(rule.set_step_text(Step::Set, "=5").is_err());
        assert_eq!(rule, sample());
    }

    #[test]
    fn test_unusable_setting_name_is_rejected() {
        let mut rule = sample();
        let err = rule
            .set_step_text(Step::Set, "iso=100\nwhite balance=auto")
            .unwrap_err();
        assert!(matches!(err, EnnError::ConditionalParse { line: 2, .. }));
        assert!(rule.set_step_text(Step::Set, "/main/iso=100").is_err());
        assert!(rule.set_step_text(Step::Set, "1st=100").is_err());
        assert_eq!(rule, sample());
    }

    #[test]
    fn test_names_with_colons_are_rejected() {
        let mut store = MemoryStore::new();
        let mut rule = sample();
        rule.name = "a:b".to_string();
        rule.device = "c".to_string();
        assert!(matches!(
            write(&mut store, &conn(), &rule),
            Err(EnnError::InvalidConditionalName { .. })
        ));
        assert!(store.keys().is_empty());
        assert!(read(&mut store, &conn(), "", "c").is_err());
        assert!(remove(&mut store, &conn(), "a:b", "c").is_err());
    }

    #[test]
    fn test_colon_in_device_keeps_rules_apart() {
        let mut store = MemoryStore::new();
        let mut rule = sample();
        rule.name = "a".to_string();
        rule.device = "b:c".to_string();
        write(&mut store, &conn(), &rule).unwrap();

        assert!(read_all(&mut store, &conn(), "c").unwrap().is_empty());
        assert_eq!(read_all(&mut store, &conn(), "b:c").unwrap(), vec![rule]);
    }

    #[test]
    fn test_step_text_roundtrip() {
        let mut rule = sample();
        let text = rule.step_text(Step::Set);
        assert_eq!(text, "iso=1600\nshutterspeed=1/30");
        rule.set_step_text(Step::Pre, " a \n\nb\n").unwrap();
        assert_eq!(rule.pre_contents, vec!["a", "b"]);
        assert_eq!(rule.step_text(Step::Pre), "a\nb");
    }
}
