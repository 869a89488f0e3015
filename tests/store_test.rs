//! Integration tests for the directory-backed snapshot store.

use disco_rs::store::{FileStore, SnapshotStore};

#[tokio::test]
async fn missing_key_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), "test").await.unwrap();

    let err = store.get("saturday-disco").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn put_then_get_returns_the_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), "test").await.unwrap();

    store.put("saturday-disco", b"{\"v\":1}").await.unwrap();
    store.put("saturday-disco", b"{\"v\":2}").await.unwrap();

    assert_eq!(store.get("saturday-disco").await.unwrap(), b"{\"v\":2}");
    assert!(dir.path().join("test").join("saturday-disco.json").exists());
    assert!(!dir.path().join("test").join("saturday-disco.json.tmp").exists());
}

#[tokio::test]
async fn environments_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let dev = FileStore::open(dir.path(), "dev").await.unwrap();
    let prod = FileStore::open(dir.path(), "prod").await.unwrap();

    dev.put("lunchtime-disco", b"dev").await.unwrap();

    assert!(prod.get("lunchtime-disco").await.unwrap_err().is_not_found());
    // Reopening sees what was written before.
    let reopened = FileStore::open(dir.path(), "dev").await.unwrap();
    assert_eq!(reopened.get("lunchtime-disco").await.unwrap(), b"dev");
}

#[tokio::test]
async fn keys_cannot_escape_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path(), "test").await.unwrap();

    for key in ["", "../outside", "a/b", ".hidden", "a\\b"] {
        assert!(store.put(key, b"x").await.is_err(), "{key:?} should be rejected");
        let err = store.get(key).await.unwrap_err();
        assert!(!err.is_not_found(), "{key:?} should be invalid, not missing");
    }
}
