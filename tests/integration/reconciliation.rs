//! Registry reconciliation against discovery results.

use std::sync::Arc;

use enn::device::mock::{MockAdapter, Operation};
use enn::device::{DeviceRegistry, DiscoveryAdapter};
use enn::error::EnnError;

use crate::common::{descriptor, init_test_logging, mock_app, record};

#[test]
fn empty_discovery_disconnects_everything_and_keeps_details() {
    init_test_logging();
    let mut registry = DeviceRegistry::from_records([
        record("A", "Canon", &[("iso", "400")]),
        record("B", "Nikon", &[]),
    ]);
    let before: Vec<_> = registry.records().to_vec();

    let report = registry.reconcile(&[]);

    assert_eq!(report.detached, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(registry.connected().count(), 0);
    for (old, new) in before.iter().zip(registry.records()) {
        assert_eq!(old.details, new.details);
        assert_eq!(old.settings, new.settings);
    }
}

#[test]
fn new_uid_adds_exactly_one_connected_record() {
    let mut registry = DeviceRegistry::from_records([record("A", "Canon", &[])]);
    let details = descriptor(&[("uid", "C"), ("name", "Fuji"), ("port", "usb:001,004")]);

    let report = registry.reconcile(std::slice::from_ref(&details));

    assert_eq!(report.added, vec!["C".to_string()]);
    assert_eq!(registry.len(), 2);
    let added = registry.get("C").unwrap();
    assert!(added.connected);
    assert_eq!(added.details, details);
}

#[test]
fn identical_discovery_twice_is_idempotent() {
    let mut registry = DeviceRegistry::new();
    let found = vec![
        descriptor(&[("uid", "A"), ("name", "Canon")]),
        descriptor(&[("uid", "B"), ("name", "Nikon")]),
    ];

    registry.reconcile(&found);
    let snapshot = registry.clone();
    let second = registry.reconcile(&found);

    assert!(second.is_unchanged());
    assert_eq!(registry, snapshot);
}

#[test]
fn rediscovered_device_keeps_settings_and_updates_details() {
    let mut registry = DeviceRegistry::from_records([record("A", "Canon", &[("iso", "100")])]);
    registry.reconcile(&[]);

    let report = registry.reconcile(&[descriptor(&[
        ("uid", "A"),
        ("name", "Canon"),
        ("port", "usb:002,003"),
    ])]);

    assert_eq!(report.attached, vec!["A".to_string()]);
    let record = registry.get("A").unwrap();
    assert!(record.connected);
    assert_eq!(record.details["port"], "usb:002,003");
    assert_eq!(record.settings["iso"], "100");
}

#[test]
fn uid_listed_twice_in_one_poll_ends_connected() {
    let mut registry = DeviceRegistry::new();
    let report = registry.reconcile(&[
        descriptor(&[("uid", "A"), ("name", "first")]),
        descriptor(&[("uid", "A"), ("name", "second")]),
    ]);

    assert_eq!(report.added, vec!["A".to_string()]);
    assert_eq!(registry.len(), 1);
    let record = registry.get("A").unwrap();
    assert!(record.connected);
    assert_eq!(record.name(), Some("second"));
}

#[test]
fn descriptors_without_uid_are_skipped() {
    let mut registry = DeviceRegistry::new();
    let report = registry.reconcile(&[
        descriptor(&[("name", "anonymous")]),
        descriptor(&[("uid", ""), ("name", "blank")]),
        descriptor(&[("uid", "A")]),
    ]);
    assert_eq!(report.skipped, 2);
    assert_eq!(registry.len(), 1);
}

#[test]
fn manual_removal_is_the_only_deletion() {
    let mut registry = DeviceRegistry::from_records([record("A", "Canon", &[])]);
    for _ in 0..3 {
        registry.reconcile(&[]);
    }
    assert_eq!(registry.len(), 1);

    assert!(registry.remove("A").is_some());
    assert!(registry.is_empty());
    assert!(registry.remove("A").is_none());
}

#[test]
fn app_follows_mock_hotplug() {
    let mock = Arc::new(MockAdapter::new());
    let mut app = mock_app(&mock);

    mock.attach(MockAdapter::camera("A", "Canon"));
    mock.attach(MockAdapter::camera("B", "Nikon"));
    assert_eq!(app.update_devices().added.len(), 2);

    mock.detach("A");
    let report = app.update_devices();
    assert_eq!(report.detached, vec!["A".to_string()]);
    assert!(!app.registry().get("A").unwrap().connected);
    assert!(app.registry().get("B").unwrap().connected);

    mock.assert_operations(&[Operation::Discover, Operation::Discover]);
}

#[test]
fn adapter_error_surfaces_from_mock() {
    let mock = MockAdapter::new();
    mock.inject_error(EnnError::NoDevicesFound);
    assert!(matches!(mock.discover(), Err(EnnError::NoDevicesFound)));
}
