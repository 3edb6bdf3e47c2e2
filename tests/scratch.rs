//! Scratch lifecycle: open, edit out-of-band, promote by content hash.

use std::fs;

use tempfile::TempDir;

use blobsync_rs::{hash, EngineError, Limits, Store, StoreError, TransferEngine};

const SHA1_HELLO: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

fn engine(dir: &TempDir) -> TransferEngine {
    let store = Store::open(dir.path().join("storage")).expect("open store");
    TransferEngine::new(store, Limits::default(), Box::new(|_, _| {}))
}

fn seed(engine: &TransferEngine, key: &str, version: &str, bytes: &[u8]) {
    let path = engine.store().add(key, version).expect("seed add");
    fs::write(path, bytes).expect("seed write");
}

#[test]
fn open_edit_close_promotes_by_hash() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);
    seed(&engine, "a", "v1", b"seed content");

    let scratch = engine.open("a", "v1").expect("open");
    assert_eq!(scratch.key(), "a");
    assert_eq!(scratch.version(), "v1.scratch");
    // The scratch starts as a byte-for-byte copy of the source version.
    assert_eq!(fs::read(scratch.path()).expect("read"), b"seed content");

    fs::write(scratch.path(), b"hello").expect("edit");
    let version = engine.close(&scratch).expect("close");

    assert_eq!(version, SHA1_HELLO);
    assert!(engine.exists("a", &version));
    assert!(engine.exists("a", "v1"));
    assert_eq!(
        fs::read(engine.path("a", &version).expect("path")).expect("read"),
        b"hello"
    );
}

#[test]
fn close_derives_the_id_from_the_bytes_alone() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);
    seed(&engine, "a", "v1", b"stable bytes");

    let scratch = engine.open("a", "v1").expect("open");
    let expected = hash::hash_file(scratch.path(), &Limits::default()).expect("hash");
    let version = engine.close(&scratch).expect("close");
    assert_eq!(version, expected);

    // An unmodified re-open hashes to the same id, which already exists.
    let scratch = engine.open("a", "v1").expect("open again");
    let err = engine.close(&scratch).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn add_creates_a_fresh_unsourced_scratch() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);

    let scratch = engine.add("b").expect("add");
    assert_eq!(scratch.version(), ".scratch");
    assert_eq!(fs::read(scratch.path()).expect("read"), b"");

    // Visible as a scratch, invisible as a version.
    let scratches = engine.scratches("b").expect("scratches");
    assert_eq!(scratches.len(), 1);
    assert_eq!(scratches[0], scratch);
    assert_eq!(engine.versions("b").expect("versions"), Vec::<String>::new());
}

#[test]
fn rename_promotes_under_a_new_key_once() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);

    let scratch = engine.add("b").expect("add");
    fs::write(scratch.path(), b"hello").expect("write");
    let version = engine.rename("c", &scratch).expect("rename");

    assert_eq!(version, SHA1_HELLO);
    assert!(!engine.exists_key("b"));
    assert!(engine.exists("c", SHA1_HELLO));

    let second = engine.add("b").expect("add again");
    fs::write(second.path(), b"other").expect("write");
    let err = engine.rename("c", &second).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Store(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn kill_discards_a_scratch() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);
    seed(&engine, "a", "v1", b"seed");

    let scratch = engine.open("a", "v1").expect("open");
    engine.kill(&scratch).expect("kill");
    assert!(engine.scratches("a").expect("scratches").is_empty());
    // Killing twice is silent.
    engine.kill(&scratch).expect("kill again");
    assert!(engine.exists("a", "v1"));
}

#[test]
fn open_requires_a_final_version() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);
    seed(&engine, "a", "v1", b"seed");

    assert!(matches!(
        engine.open("ghost", "v1").unwrap_err(),
        EngineError::Store(StoreError::NoSuchKey { .. })
    ));
    assert!(matches!(
        engine.open("a", "v9").unwrap_err(),
        EngineError::Store(StoreError::NoSuchVersion { .. })
    ));
    // Tagged names are not final versions.
    seed(&engine, "a", "v2.pending", b"partial");
    assert!(matches!(
        engine.open("a", "v2.pending").unwrap_err(),
        EngineError::Store(StoreError::NoSuchVersion { .. })
    ));
}

#[test]
fn listings_filter_by_lifecycle_tag() {
    let dir = TempDir::new().expect("temp dir");
    let engine = engine(&dir);
    seed(&engine, "a", "v1", b"one");
    seed(&engine, "a", "v2", b"two");
    seed(&engine, "a", "v3.pending", b"partial");
    engine.open("a", "v1").expect("open scratch");

    assert_eq!(
        engine.versions("a").expect("versions"),
        vec!["v1".to_string(), "v2".to_string()]
    );
    let scratches = engine.scratches("a").expect("scratches");
    assert_eq!(scratches.len(), 1);
    assert_eq!(scratches[0].version(), "v1.scratch");
    // Unknown keys just yield empty listings.
    assert_eq!(engine.versions("nope").expect("versions"), Vec::<String>::new());
}
