//! Corruption recovery of per-peer settings.

use std::sync::Arc;

use livesync_bridge::store::{ResilientSettings, SharedStore};
use livesync_bridge_testkit::{identity, Fault, FaultyStore, Op};

fn shared(store: &Arc<FaultyStore>) -> SharedStore {
    SharedStore::new(store.clone())
}

fn peer_settings(name: &str, shared: &SharedStore) -> ResilientSettings {
    ResilientSettings::new(identity(name, "vault/"), shared.clone())
}

fn settings(name: &str, store: &Arc<FaultyStore>) -> ResilientSettings {
    peer_settings(name, &shared(store))
}

#[test]
fn corrupted_write_clears_once_and_retries_once() {
    let store = Arc::new(FaultyStore::new());
    store.fail_next(Op::Set, Fault::Corrupt);
    let settings = settings("a", &store);

    settings.set_setting("since", "42").unwrap();

    assert_eq!(store.clears(), 1);
    assert_eq!(store.sets(), 2);
    assert_eq!(settings.get_setting("since").unwrap().as_deref(), Some("42"));
}

#[test]
fn second_corrupted_write_propagates() {
    let store = Arc::new(FaultyStore::new());
    store
        .fail_next(Op::Set, Fault::Corrupt)
        .fail_next(Op::Set, Fault::Corrupt);
    let settings = settings("a", &store);

    let err = settings.set_setting("since", "42").unwrap_err();

    assert!(err.is_corruption());
    assert_eq!(store.clears(), 1);
    assert_eq!(store.sets(), 2);
}

#[test]
fn corrupted_read_degrades_to_none() {
    let store = Arc::new(FaultyStore::new());
    store
        .fail_next(Op::Get, Fault::Corrupt)
        .fail_next(Op::Get, Fault::Corrupt);
    let settings = settings("a", &store);

    assert_eq!(settings.get_setting("since").unwrap(), None);
    assert_eq!(store.clears(), 1);
    assert_eq!(store.gets(), 2);
}

#[test]
fn ordinary_errors_skip_recovery() {
    let store = Arc::new(FaultyStore::new());
    store
        .fail_next(Op::Set, Fault::Other)
        .fail_next(Op::Get, Fault::Other);
    let settings = settings("a", &store);

    assert!(!settings.set_setting("k", "v").unwrap_err().is_corruption());
    assert!(settings.get_setting("k").is_err());
    assert_eq!(store.clears(), 0);
    assert_eq!(store.sets(), 1);
}

#[test]
fn failed_clear_returns_original_error() {
    let store = Arc::new(FaultyStore::new());
    store
        .fail_next(Op::Set, Fault::Corrupt)
        .fail_next(Op::Clear, Fault::Other);
    let settings = settings("a", &store);

    let err = settings.set_setting("k", "v").unwrap_err();

    assert!(err.is_corruption());
    assert_eq!(store.sets(), 1);
}

#[test]
fn recovery_wipes_every_peer() {
    let store = Arc::new(FaultyStore::new());
    let shared = shared(&store);
    let a = peer_settings("a", &shared);
    let b = peer_settings("b", &shared);
    a.set_setting("k", "from-a").unwrap();

    store.fail_next(Op::Set, Fault::Corrupt);
    b.set_setting("k", "from-b").unwrap();

    assert_eq!(a.get_setting("k").unwrap(), None);
    assert_eq!(b.get_setting("k").unwrap().as_deref(), Some("from-b"));
}

#[test]
fn corrupted_remove_is_retried() {
    let store = Arc::new(FaultyStore::new());
    let settings = settings("a", &store);
    settings.set_setting("k", "v").unwrap();

    store.fail_next(Op::Remove, Fault::Corrupt);
    settings.remove_setting("k").unwrap();

    assert_eq!(store.removes(), 2);
    assert!(store.inner().is_empty());
}

#[test]
fn later_corruption_recovers_again() {
    let store = Arc::new(FaultyStore::new());
    let shared = shared(&store);
    let a = peer_settings("a", &shared);
    let b = peer_settings("b", &shared);

    store.fail_next(Op::Set, Fault::Corrupt);
    a.set_setting("k", "from-a").unwrap();
    store.fail_next(Op::Set, Fault::Corrupt);
    b.set_setting("k", "from-b").unwrap();

    assert_eq!(store.clears(), 2);
    assert_eq!(a.get_setting("k").unwrap(), None);
    assert_eq!(b.get_setting("k").unwrap().as_deref(), Some("from-b"));
}
