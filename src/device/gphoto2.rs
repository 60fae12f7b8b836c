//! Discovery adapter driving the `gphoto2` command-line tool.

use std::collections::BTreeMap;
use std::process::{Command, Output};

use tracing::{debug, instrument, trace, warn};

use super::record::{Descriptor, DISCOVERY, NAME, UID};
use super::{store_capture, DiscoveryAdapter};
use crate::error::{EnnError, Result};
use crate::store::SettingsStore;

const ADAPTER_NAME: &str = "gphoto2";

/// Parse `gphoto2 --auto-detect` output into `(model, port)` pairs.
///
/// ```text
/// Model                          Port
/// ----------------------------------------------------------
/// Canon EOS 450D (Rebel XSi)     usb:001,005
/// ```
pub fn parse_auto_detect(text: &str) -> Vec<(String, String)> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|line| {
            let (model, port) = line.trim_end().rsplit_once(char::is_whitespace)?;
            let model = model.trim();
            if model.is_empty() || !port.contains(':') {
                return None;
            }
            Some((model.to_string(), port.to_string()))
        })
        .collect()
}

/// Extract the `Current:` value from `gphoto2 --get-config` output.
pub fn parse_config_value(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("Current:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn fallback_uid(model: &str, port: &str) -> String {
    let model: String = model
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{model}@{port}")
}

/// Runs the gphoto2 binary for discovery, settings and capture.
pub struct Gphoto2Adapter {
    binary: String,
}

impl Default for Gphoto2Adapter {
    fn default() -> Self {
        Self::new(ADAPTER_NAME)
    }
}

impl Gphoto2Adapter {
    /// Use `binary` (name on `PATH` or absolute path) as the gphoto2 executable.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        trace!(binary = %self.binary, ?args, "Running gphoto2");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| EnnError::Adapter(format!("failed to run {}: {e}", self.binary)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnnError::Adapter(format!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output)
    }

    fn port<'a>(details: &'a Descriptor) -> Result<&'a str> {
        details
            .get("port")
            .map(String::as_str)
            .ok_or_else(|| EnnError::Adapter("device has no port".to_string()))
    }

    fn serial_number(&self, port: &str) -> Option<String> {
        match self.run(&["--port", port, "--get-config", "serialnumber"]) {
            Ok(output) => parse_config_value(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                debug!(port, error = %e, "No serial number reported");
                None
            }
        }
    }
}

impl DiscoveryAdapter for Gphoto2Adapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    #[instrument(skip(self))]
    fn discover(&self) -> Result<Vec<Descriptor>> {
        let output = self.run(&["--auto-detect"])?;
        let detected = parse_auto_detect(&String::from_utf8_lossy(&output.stdout));

        let devices = detected
            .into_iter()
            .map(|(model, port)| {
                let uid = self
                    .serial_number(&port)
                    .unwrap_or_else(|| fallback_uid(&model, &port));
                let mut details = Descriptor::new();
                details.insert(UID.to_string(), uid);
                details.insert(NAME.to_string(), model);
                details.insert("port".to_string(), port);
                details.insert(DISCOVERY.to_string(), ADAPTER_NAME.to_string());
                details
            })
            .collect::<Vec<_>>();
        debug!(count = devices.len(), "gphoto2 discovery finished");
        Ok(devices)
    }

    fn set_setting(&self, details: &Descriptor, name: &str, value: &str) -> Result<()> {
        let port = Self::port(details)?;
        let assignment = format!("{name}={value}");
        self.run(&["--port", port, "--set-config", &assignment])?;
        debug!(port, setting = name, value, "Setting applied");
        Ok(())
    }

    fn slurp(
        &self,
        store: &mut dyn SettingsStore,
        details: &Descriptor,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let port = Self::port(details)?;
        let output = self.run(&["--port", port, "--capture-image-and-download", "--stdout"])?;
        if output.stdout.is_empty() {
            warn!(port, "Capture produced no data");
            return Err(EnnError::Adapter("capture produced no data".to_string()));
        }
        let uid = details.get(UID).map_or("", String::as_str);
        let key = store_capture(store, uid, &output.stdout, metadata)?;
        Ok(vec![key])
    }
}
