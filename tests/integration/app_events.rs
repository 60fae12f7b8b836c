//! Event handling and device operations through `App`.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use enn::conditional::Conditional;
use enn::device::mock::{MockAdapter, Operation};
use enn::error::EnnError;
use enn::events::{Event, EventQueue};
use enn::reference::{self, Reference};
use enn::session;
use enn::store::{MemoryStore, SettingsStore};
use tempfile::TempDir;

use crate::common::{conn, init_test_logging, mock_app};

#[test]
fn queue_coalesces_duplicates_within_a_tick() {
    let queue = EventQueue::new();
    let sender = queue.sender();
    for _ in 0..5 {
        sender.send(Event::KeyChanged("machinic:env:127.0.0.1:6379".to_string())).unwrap();
    }
    sender.send(Event::UsbDetached("1-4".to_string())).unwrap();

    assert_eq!(queue.tick().len(), 2);
    assert!(queue.tick().is_empty());
}

#[test]
fn store_writes_notify_the_queue() {
    let queue = EventQueue::new();
    let mut store = MemoryStore::new().with_notifier(queue.sender());
    store.hash_set("machinic:env:127.0.0.1:6379", "mode", "day").unwrap();
    store.hash_set("machinic:env:127.0.0.1:6379", "mode", "night").unwrap();

    assert_eq!(
        queue.tick(),
        vec![Event::KeyChanged("machinic:env:127.0.0.1:6379".to_string())]
    );
}

#[test]
fn usb_poller_drives_rediscovery() {
    init_test_logging();
    let usb_root = TempDir::new().unwrap();
    let mock = Arc::new(MockAdapter::new());
    let mut app = mock_app(&mock);
    app.start_usb_poller(usb_root.path().to_path_buf(), Duration::from_millis(10))
        .unwrap();

    mock.attach(MockAdapter::camera("A", "Canon"));
    fs::create_dir(usb_root.path().join("1-1")).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut report = app.tick();
    while report.reconcile.is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
        report = app.tick();
    }
    app.shutdown();

    assert_eq!(report.events, vec![Event::UsbAttached("1-1".to_string())]);
    assert_eq!(report.reconcile.unwrap().added, vec!["A".to_string()]);
    assert!(app.registry().get("A").unwrap().connected);
}

#[test]
fn conditional_apply_pushes_each_setting() {
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    let mut app = mock_app(&mock);
    app.update_devices();

    let mut rule = Conditional::new("portrait", "A");
    rule.set_step_text(enn::conditional::Step::Set, "aperture=2.8\niso=200")
        .unwrap();
    app.write_conditional(&rule).unwrap();
    assert_eq!(app.conditionals("A").unwrap(), vec![rule]);

    mock.clear_operations();
    assert_eq!(app.apply_conditional("A", "portrait").unwrap(), 2);
    mock.assert_operations(&[
        Operation::SetSetting {
            uid: "A".to_string(),
            name: "aperture".to_string(),
            value: "2.8".to_string(),
        },
        Operation::SetSetting {
            uid: "A".to_string(),
            name: "iso".to_string(),
            value: "200".to_string(),
        },
    ]);

    assert!(app.remove_conditional("portrait", "A").unwrap());
    assert!(app.conditional("portrait", "A").unwrap().is_none());
}

#[test]
fn setting_failure_does_not_abort_the_rule() {
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    let mut app = mock_app(&mock);
    app.update_devices();
    mock.fail_setting("aperture");

    let mut rule = Conditional::new("portrait", "A");
    rule.set_contents.insert("aperture".to_string(), "2.8".to_string());
    rule.set_contents.insert("iso".to_string(), "200".to_string());
    app.write_conditional(&rule).unwrap();

    assert_eq!(app.apply_conditional("A", "portrait").unwrap(), 1);
    let settings = &app.registry().get("A").unwrap().settings;
    assert_eq!(settings["aperture"], "2.8");
    assert_eq!(settings["iso"], "200");
}

#[test]
fn slurp_of_detached_device_fails_cleanly() {
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    let mut app = mock_app(&mock);
    app.update_devices();
    mock.detach("A");

    let err = app.slurp("A", &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, EnnError::Adapter(_)));
    assert!(matches!(
        app.slurp("missing", &BTreeMap::new()),
        Err(EnnError::DeviceNotFound { .. })
    ));
}

#[test]
fn adjustable_settings_follow_the_reference() {
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon EOS 450D (Rebel XSi)"));
    mock.attach(MockAdapter::camera("B", "Mystery Cam"));
    let mut app = mock_app(&mock);
    app.update_devices();

    Reference::parse(reference::DEFAULT_REFERENCE)
        .unwrap()
        .store(app.store_mut())
        .unwrap();

    let settings = app.adjustable_settings("A").unwrap().unwrap();
    assert!(settings.contains_key("iso"));
    assert_eq!(app.adjustable_settings("B").unwrap(), None);
}

#[test]
fn env_values_are_scoped_to_the_connection() {
    let mock = Arc::new(MockAdapter::new());
    let mut app = mock_app(&mock);
    app.set_env("mode", "night").unwrap();

    let key = conn().env_key();
    assert_eq!(key, "machinic:env:127.0.0.1:6379");
    assert_eq!(
        app.store_mut().hash_get(&key, "mode").unwrap(),
        Some("night".to_string())
    );
}

#[test]
fn removed_device_leaves_the_saved_session() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session_127.0.0.1_6379.xml");
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    mock.attach(MockAdapter::camera("B", "Nikon"));
    let mut app = mock_app(&mock).with_session(&path);
    app.update_devices();
    mock.detach("B");
    app.update_devices();

    assert!(app.registry_mut().remove("B").is_some());
    app.save_session().unwrap();

    let reloaded = enn::session::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get("A").is_some());
}

#[test]
fn spaced_setting_name_cannot_wipe_the_session() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session_127.0.0.1_6379.xml");
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    mock.attach(MockAdapter::camera("B", "Nikon"));

    let mut app = mock_app(&mock).with_session(&path);
    app.update_devices();
    assert!(matches!(
        app.apply_setting("A", "white balance", "auto"),
        Err(EnnError::InvalidFieldName { .. })
    ));
    app.apply_setting("A", "whitebalance", "auto").unwrap();
    app.shutdown();

    let mut restarted = mock_app(&mock).with_session(&path);
    assert_eq!(restarted.registry().len(), 2);
    assert_eq!(
        restarted.registry().get("A").unwrap().settings["whitebalance"],
        "auto"
    );
    restarted.shutdown();
    assert_eq!(session::load(&path).unwrap().len(), 2);
}

#[test]
fn unreadable_session_survives_shutdown() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session_127.0.0.1_6379.xml");
    let broken = "<machine><session><device uid=\"A\"><settings white balance=\"auto\"/>";
    fs::write(&path, broken).unwrap();

    let mock = Arc::new(MockAdapter::new());
    let mut app = mock_app(&mock).with_session(&path);
    assert!(app.registry().is_empty());
    app.shutdown();

    let aside = enn::app::bad_session_path(&path);
    assert_eq!(fs::read_to_string(aside).unwrap(), broken);
    assert!(session::load(&path).unwrap().is_empty());
}

#[test]
fn stored_rule_with_unusable_setting_name_applies_the_rest() {
    let mock = Arc::new(MockAdapter::new());
    mock.attach(MockAdapter::camera("A", "Canon"));
    let mut app = mock_app(&mock);
    app.update_devices();

    let mut rule = Conditional::new("portrait", "A");
    rule.set_contents.insert("white balance".to_string(), "auto".to_string());
    rule.set_contents.insert("iso".to_string(), "200".to_string());
    app.write_conditional(&rule).unwrap();

    assert_eq!(app.apply_conditional("A", "portrait").unwrap(), 1);
    let settings = &app.registry().get("A").unwrap().settings;
    assert_eq!(settings.len(), 1);
    assert_eq!(settings["iso"], "200");
}
