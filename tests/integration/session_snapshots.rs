//! Session documents written to and read from disk.

use std::fs;

use enn::device::DeviceRegistry;
use enn::error::EnnError;
use enn::session;
use tempfile::TempDir;

use crate::common::fixtures::{TestConfig, TWO_DEVICE_SESSION};
use crate::common::record;

#[test]
fn save_then_load_preserves_uids_details_and_settings() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session_127.0.0.1_6379.xml");
    let registry = DeviceRegistry::from_records([
        record("A", "Canon", &[("iso", "400")]),
        record("B", "Nikon", &[("aperture", "11"), ("iso", "200")]),
    ]);

    session::save(&registry, &path).unwrap();
    let loaded = session::load(&path).unwrap();

    let uids: Vec<&str> = loaded.records().iter().map(|r| r.uid()).collect();
    assert_eq!(uids, vec!["A", "B"]);
    for (saved, restored) in registry.records().iter().zip(loaded.records()) {
        assert_eq!(saved.details, restored.details);
        assert_eq!(saved.settings, restored.settings);
        assert!(!restored.connected);
    }
}

#[test]
fn resaving_a_loaded_session_is_byte_identical() {
    let config = TestConfig::new();
    let path = config.write_session("127.0.0.1", 6379, TWO_DEVICE_SESSION);

    let loaded = session::load(&path).unwrap();
    session::save(&loaded, &path).unwrap();
    let first = fs::read_to_string(&path).unwrap();

    let reloaded = session::load(&path).unwrap();
    session::save(&reloaded, &path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
    assert_eq!(first, TWO_DEVICE_SESSION);
}

#[test]
fn hand_written_session_is_accepted() {
    let config = TestConfig::new();
    let path = config.write_session(
        "10.0.0.5",
        7000,
        "<machine><session><device uid='X' name='Webcam'><settings gain='3'/></device></session></machine>",
    );

    let registry = session::load(&path).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("X").unwrap().settings["gain"], "3");
}

#[test]
fn missing_session_is_an_empty_registry() {
    let config = TestConfig::new();
    let registry = session::load(&config.session_dir().join("nothing_here.xml")).unwrap();
    assert!(registry.is_empty());
}

#[test]
fn malformed_session_is_reported() {
    let config = TestConfig::new();
    let path = config.write_session("127.0.0.1", 6379, "<machine><session><device uid=\"A\">");
    assert!(matches!(
        session::load(&path),
        Err(EnnError::SessionFormat(_))
    ));
}

#[test]
fn unwritable_name_leaves_existing_file_untouched() {
    let config = TestConfig::new();
    let path = config.write_session("127.0.0.1", 6379, TWO_DEVICE_SESSION);

    let registry = DeviceRegistry::from_records([record("A", "Canon", &[("white balance", "auto")])]);
    assert!(matches!(
        session::save(&registry, &path),
        Err(EnnError::SessionFormat(_))
    ));
    assert_eq!(fs::read_to_string(&path).unwrap(), TWO_DEVICE_SESSION);
}

#[test]
fn quoted_and_multiline_values_survive_a_save() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session_127.0.0.1_6379.xml");
    let registry = DeviceRegistry::from_records([record(
        "usb:001,005",
        "Canon \"Rebel\" <XSi> & co",
        &[
            ("artist", "O'Brien / studio 2"),
            ("comment", "line one\nline two"),
            ("exposure-compensation", "-0.3"),
        ],
    )]);

    session::save(&registry, &path).unwrap();
    let loaded = session::load(&path).unwrap();
    let restored = loaded.get("usb:001,005").unwrap();
    assert_eq!(restored.details, registry.records()[0].details);
    assert_eq!(restored.settings, registry.records()[0].settings);
}
