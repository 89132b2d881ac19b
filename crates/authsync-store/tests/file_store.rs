//! `SessionStore` over `FileStorage`: persistence across reloads and
//! sibling notifications.

use std::sync::Arc;

use authsync_protocol::{AuthSnapshot, UserId};
use authsync_store::{FileStorage, SessionStore, SnapshotStorage, StoreConfig};

fn snap(id: &str, name: &str) -> AuthSnapshot {
    AuthSnapshot::new(UserId::new(id).unwrap(), name, "", "https://cdn.example.com/a.png")
}

#[test]
fn test_file_store_survives_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let saved = snap("4012", "Grace");

    {
        let mut store = SessionStore::open(FileStorage::new(tmp.path()), StoreConfig::default());
        store.save(Some(saved.clone()));
    }

    let store = SessionStore::open(FileStorage::new(tmp.path()), StoreConfig::default());
    assert_eq!(store.current(), Some(&saved));
}

#[test]
fn test_file_store_persisted_layout_is_camel_case_json() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(tmp.path());
    let mut store = SessionStore::open(FileStorage::new(tmp.path()), StoreConfig::default());

    store.save(Some(snap("4012", "Grace")));

    let raw = std::fs::read_to_string(storage.path_for("authsync.snapshot")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["userId"], "4012");
    assert_eq!(value["displayName"], "Grace");
    assert_eq!(value["email"], "");
    assert!(value["capturedAt"].is_string());
}

#[test]
fn test_file_store_logout_removes_file() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(tmp.path());
    let mut store = SessionStore::open(FileStorage::new(tmp.path()), StoreConfig::default());
    store.save(Some(snap("1", "A")));

    store.save(None);

    assert!(storage.get("authsync.snapshot").unwrap().is_none());
}

#[test]
fn test_file_store_custom_key() {
    let tmp = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        key: "community/session".into(),
        ..StoreConfig::default()
    };
    let storage = FileStorage::new(tmp.path());
    let mut store = SessionStore::open(FileStorage::new(tmp.path()), config);

    store.save(Some(snap("1", "A")));

    assert!(storage.path_for("community/session").exists());
    assert!(tmp.path().join("community_session.json").exists());
}

#[test]
fn test_shared_file_storage_notifies_sibling() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(tmp.path()));
    let mut tab_a = SessionStore::open(Arc::clone(&storage), StoreConfig::default());
    let mut tab_b = SessionStore::open(Arc::clone(&storage), StoreConfig::default());
    let mut rx_b = tab_b.subscribe();

    tab_a.save(Some(snap("9", "Nine")));

    let change = rx_b.try_recv().expect("sibling notified");
    assert!(tab_b.is_foreign_change(&change));
    let seen = tab_b.load();
    assert_eq!(seen.as_ref().map(|s| s.user_id.as_str()), Some("9"));
}
