//! Conditional rule storage through the in-memory store.

use enn::conditional::{self, step_key, Conditional, Step};
use enn::error::EnnError;
use enn::store::memory::StoreOp;
use enn::store::{MemoryStore, SettingsStore};

use crate::common::conn;

fn night_rule() -> Conditional {
    let mut rule = Conditional::new("night", "cam-1");
    rule.pre_contents = vec!["check_light.sh".to_string(), "lamp_on.sh".to_string()];
    rule.set_contents.insert("iso".to_string(), "1600".to_string());
    rule.set_contents
        .insert("shutterspeed".to_string(), "1/30".to_string());
    rule.post_contents = vec!["notify.sh".to_string()];
    rule
}

#[test]
fn empty_pre_step_writes_no_pre_key() {
    let mut store = MemoryStore::new();
    let mut rule = Conditional::new("day", "cam-1");
    rule.set_contents.insert("iso".to_string(), "100".to_string());

    conditional::write(&mut store, &conn(), &rule).unwrap();

    assert!(!store.exists(&step_key(Step::Pre, "day", "cam-1", &conn())).unwrap());
    assert!(store.exists(&step_key(Step::Set, "day", "cam-1", &conn())).unwrap());
    assert!(!store.exists(&step_key(Step::Post, "day", "cam-1", &conn())).unwrap());
}

#[test]
fn read_back_recovers_every_step() {
    let mut store = MemoryStore::new();
    let rule = night_rule();
    conditional::write(&mut store, &conn(), &rule).unwrap();

    let loaded = conditional::read(&mut store, &conn(), "night", "cam-1")
        .unwrap()
        .unwrap();
    assert_eq!(loaded, rule);

    let all = conditional::read_all(&mut store, &conn(), "cam-1").unwrap();
    assert_eq!(all, vec![rule]);
}

#[test]
fn rewrite_replaces_previous_steps() {
    let mut store = MemoryStore::new();
    conditional::write(&mut store, &conn(), &night_rule()).unwrap();

    let mut smaller = Conditional::new("night", "cam-1");
    smaller.post_contents = vec!["done.sh".to_string()];
    store.clear_operations();
    conditional::write(&mut store, &conn(), &smaller).unwrap();

    let loaded = conditional::read(&mut store, &conn(), "night", "cam-1")
        .unwrap()
        .unwrap();
    assert_eq!(loaded, smaller);

    let ops = store.operations();
    assert!(matches!(ops.first(), Some(StoreOp::Delete { .. })));
    assert!(ops.iter().any(|op| matches!(op, StoreOp::ListPush { count: 1, .. })));
}

#[test]
fn rules_are_scoped_by_device_and_store() {
    let mut store = MemoryStore::new();
    conditional::write(&mut store, &conn(), &night_rule()).unwrap();
    let mut other = night_rule();
    other.device = "cam-2".to_string();
    conditional::write(&mut store, &conn(), &other).unwrap();

    assert_eq!(conditional::read_all(&mut store, &conn(), "cam-1").unwrap().len(), 1);
    let elsewhere = enn::config::ConnectionConfig::new("10.0.0.5", 7000);
    assert!(conditional::read_all(&mut store, &elsewhere, "cam-1")
        .unwrap()
        .is_empty());
}

#[test]
fn removed_rule_no_longer_exists() {
    let mut store = MemoryStore::new();
    conditional::write(&mut store, &conn(), &night_rule()).unwrap();

    assert!(conditional::remove(&mut store, &conn(), "night", "cam-1").unwrap());
    assert!(conditional::read(&mut store, &conn(), "night", "cam-1")
        .unwrap()
        .is_none());
    assert!(!conditional::remove(&mut store, &conn(), "night", "cam-1").unwrap());
    assert!(store.keys().is_empty());
}

#[test]
fn malformed_text_keeps_prior_value() {
    let mut rule = night_rule();
    let before = rule.clone();

    let err = rule
        .set_step_text(Step::Set, "iso=800\nnot a setting\n")
        .unwrap_err();
    assert!(matches!(err, EnnError::ConditionalParse { line: 2, .. }));
    assert_eq!(rule, before);

    rule.set_step_text(Step::Set, "# evening\niso = 800\n\naperture=5.6")
        .unwrap();
    assert_eq!(rule.set_contents.len(), 2);
    assert_eq!(rule.set_contents["iso"], "800");
}

#[test]
fn step_text_round_trips_through_editing() {
    let rule = night_rule();
    let mut edited = Conditional::new("night", "cam-1");
    for step in Step::ALL {
        edited.set_step_text(step, &rule.step_text(step)).unwrap();
    }
    assert_eq!(edited, rule);
}
