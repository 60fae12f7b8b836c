//! Store key encoding for conditional steps.

use super::Step;
use crate::config::ConnectionConfig;
use crate::store::escape_glob;

const PREFIX: &str = "settings";

/// Key holding one step of a rule.
pub fn step_key(step: Step, name: &str, device: &str, conn: &ConnectionConfig) -> String {
    format!(
        "{PREFIX}:{step}:{name}:{device}:{}:{}",
        conn.host, conn.port
    )
}

/// Glob matching every step key of every rule for `device`.
pub fn device_pattern(device: &str, conn: &ConnectionConfig) -> String {
    format!(
        "{PREFIX}:*:*:{}:{}:{}",
        escape_glob(device),
        escape_glob(&conn.host),
        conn.port
    )
}

/// Split a step key for `device` back into its step and rule name.
///
/// The rule name is whatever sits between the step and the known
/// `:<device>:<host>:<port>` suffix. Rule names never contain `:`, so a
/// key whose remainder does belongs to another device.
pub fn parse_key(key: &str, device: &str, conn: &ConnectionConfig) -> Option<(Step, String)> {
    let rest = key.strip_prefix(PREFIX)?.strip_prefix(':')?;
    let (step, rest) = rest.split_once(':')?;
    let step = step.parse::<Step>().ok()?;
    let suffix = format!(":{device}:{}:{}", conn.host, conn.port);
    let name = rest.strip_suffix(&suffix)?;
    if name.is_empty() || name.contains(':') {
        return None;
    }
    Some((step, name.to_string()))
}
