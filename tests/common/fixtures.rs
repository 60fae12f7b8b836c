//! Temporary config and session fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary directory holding a config file whose `session_dir` points
/// inside the same directory.
pub struct TestConfig {
    pub dir: TempDir,
}

impl TestConfig {
    /// Config with only `session_dir` set.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be written.
    pub fn new() -> Self {
        Self::with_contents("session_dir = \"sessions\"\n")
    }

    /// Config with the given TOML contents.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be written.
    pub fn with_contents(contents: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::write(dir.path().join("config.toml"), contents).expect("write config");
        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.dir.path().join("sessions")
    }

    /// Write a session document for `host:port`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_session(&self, host: &str, port: u16, xml: &str) -> PathBuf {
        let path = self.session_dir().join(format!("session_{host}_{port}.xml"));
        write_file(&path, xml);
        path
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

/// A session with two devices, one of which has settings.
pub const TWO_DEVICE_SESSION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<machine>
  <session>
    <device discovery="gphoto2" name="Canon EOS 450D (Rebel XSi)" uid="A">
      <settings aperture="8" iso="400"/>
    </device>
    <device discovery="gphoto2" name="Nikon DSC D90 (PTP mode)" uid="B">
      <settings/>
    </device>
  </session>
</machine>
"#;
